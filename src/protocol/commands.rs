//! Module `commands`
//!
//! The file manager actions a client can request.

/// One file manager action, named the way clients send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DirList,
    CreateDir,
    DeleteDir,
    MoveDir,
    CopyDir,
    RenameDir,
    FilesList,
    Upload,
    Download,
    DownloadDir,
    DeleteFile,
    MoveFile,
    CopyFile,
    RenameFile,
    Thumb,
}

impl Action {
    /// Case-insensitive lookup of an action name; `None` if unknown.
    pub fn from_name(raw: &str) -> Option<Action> {
        let action = match raw.trim().to_ascii_lowercase().as_str() {
            "dirlist" => Action::DirList,
            "createdir" => Action::CreateDir,
            "deletedir" => Action::DeleteDir,
            "movedir" => Action::MoveDir,
            "copydir" => Action::CopyDir,
            "renamedir" => Action::RenameDir,
            "fileslist" | "filelist" => Action::FilesList,
            "upload" => Action::Upload,
            "download" => Action::Download,
            "downloaddir" => Action::DownloadDir,
            "deletefile" => Action::DeleteFile,
            "movefile" => Action::MoveFile,
            "copyfile" => Action::CopyFile,
            "renamefile" => Action::RenameFile,
            "thumb" | "generatethumb" => Action::Thumb,
            _ => return None,
        };
        Some(action)
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::DirList => "dirlist",
            Action::CreateDir => "createdir",
            Action::DeleteDir => "deletedir",
            Action::MoveDir => "movedir",
            Action::CopyDir => "copydir",
            Action::RenameDir => "renamedir",
            Action::FilesList => "fileslist",
            Action::Upload => "upload",
            Action::Download => "download",
            Action::DownloadDir => "downloaddir",
            Action::DeleteFile => "deletefile",
            Action::MoveFile => "movefile",
            Action::CopyFile => "copyfile",
            Action::RenameFile => "renamefile",
            Action::Thumb => "thumb",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(Action::from_name("DIRLIST"), Some(Action::DirList));
        assert_eq!(Action::from_name(" renameFile "), Some(Action::RenameFile));
        assert_eq!(Action::from_name("FILELIST"), Some(Action::FilesList));
        assert_eq!(Action::from_name("format"), None);
    }

    #[test]
    fn canonical_names_parse_back() {
        for action in [Action::DownloadDir, Action::Thumb, Action::CopyDir] {
            assert_eq!(Action::from_name(action.name()), Some(action));
        }
    }
}
