//! Request dispatch
//!
//! Routes a parsed request to the facade of the selected profile.

use log::debug;

use crate::controller::responses::{self, Reply};
use crate::error::RequestError;
use crate::filesystem::{FileSystem, ProfileRegistry};
use crate::protocol::{Action, Request};
use crate::transfer::IncomingFile;
use crate::transfer::file_ops::drain;

/// Runs `request` against its profile. `uploads` carries the part bodies of
/// an upload request and is empty otherwise; parts are always consumed, even
/// when the request is rejected.
pub async fn dispatch(
    registry: &ProfileRegistry,
    request: &Request,
    mut uploads: Vec<IncomingFile>,
) -> Reply {
    let filesystem = match registry.get(request.profile()) {
        Ok(filesystem) => filesystem,
        Err(e) => {
            discard(&mut uploads).await;
            return responses::request_error(&e);
        }
    };
    debug!("{} on profile '{}'", request.action.name(), filesystem.profile());

    if request.action == Action::Upload {
        return match request.require("d") {
            Ok(dir) => responses::json(&filesystem.upload(dir, uploads).await),
            Err(e) => {
                discard(&mut uploads).await;
                responses::request_error(&e)
            }
        };
    }

    discard(&mut uploads).await;
    match run(&filesystem, request).await {
        Ok(reply) => reply,
        Err(e) => responses::request_error(&e),
    }
}

async fn run(fs: &FileSystem, request: &Request) -> Result<Reply, RequestError> {
    let reply = match request.action {
        Action::DirList => responses::listing(fs.list_tree().await),
        Action::FilesList => {
            let dir = request.param("d").unwrap_or("/");
            responses::listing(fs.list_files(dir).await)
        }
        Action::CreateDir => {
            let result = fs
                .create_directory(request.require("d")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::DeleteDir => responses::json(&fs.delete_directory(request.require("d")?).await),
        Action::MoveDir => {
            let result = fs
                .move_directory(request.require("d")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::CopyDir => {
            let result = fs
                .copy_directory(request.require("d")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::RenameDir => {
            let result = fs
                .rename_directory(request.require("d")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::DeleteFile => responses::json(&fs.delete_file(request.require("f")?).await),
        Action::MoveFile => {
            let result = fs
                .move_file(request.require("f")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::CopyFile => {
            let result = fs
                .copy_file(request.require("f")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::RenameFile => {
            let result = fs
                .rename_file(request.require("f")?, request.require("n")?)
                .await;
            responses::json(&result)
        }
        Action::Download => responses::stream(fs.download(request.require("f")?).await),
        Action::DownloadDir => {
            responses::stream(fs.download_directory(request.require("d")?).await)
        }
        Action::Thumb => {
            let file = request.require("f")?;
            let width = request.number("width")?;
            let height = request.number("height")?;
            responses::stream(fs.thumbnail(file, width, height).await)
        }
        Action::Upload => return Err(RequestError::InvalidParameter("upload without parts".into())),
    };
    Ok(reply)
}

async fn discard(uploads: &mut Vec<IncomingFile>) {
    for part in uploads.iter_mut() {
        drain(&mut part.data).await;
    }
    uploads.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::FileSystemSettings;
    use crate::protocol::parse_request;
    use crate::transfer::bytes_stream;
    use tempfile::TempDir;

    fn registry(root: &TempDir) -> ProfileRegistry {
        let mut registry = ProfileRegistry::new("default");
        registry.register(
            FileSystem::local("default", root.path(), &FileSystemSettings::default()).unwrap(),
        );
        registry
    }

    fn body(reply: Reply) -> String {
        match reply {
            Reply::Json(body) => body,
            other => panic!("expected json, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mutation_renders_standard_response() {
        let root = TempDir::new().unwrap();
        let registry = registry(&root);

        let request = parse_request("createdir?d=/&n=docs").unwrap();
        assert_eq!(
            body(dispatch(&registry, &request, Vec::new()).await),
            r#"{"res":"ok","msg":null}"#
        );

        let listing = body(dispatch(&registry, &parse_request("dirlist").unwrap(), Vec::new()).await);
        assert!(listing.contains(r#"{"p":"/docs","f":0,"d":0}"#));
    }

    #[tokio::test]
    async fn missing_parameter_is_a_bad_request() {
        let root = TempDir::new().unwrap();
        let registry = registry(&root);
        let reply = body(dispatch(&registry, &parse_request("deletefile").unwrap(), Vec::new()).await);
        assert!(reply.contains(r#""code":"bad_request""#));
    }

    #[tokio::test]
    async fn unknown_profile_is_reported() {
        let root = TempDir::new().unwrap();
        let registry = registry(&root);
        let request = parse_request("dirlist?profile=ghost").unwrap();
        let reply = body(dispatch(&registry, &request, Vec::new()).await);
        assert!(reply.contains(r#""code":"unknown_profile""#));
    }

    #[tokio::test]
    async fn upload_then_download_streams_content() {
        let root = TempDir::new().unwrap();
        let registry = registry(&root);

        let upload = parse_request("upload?d=/&name=a.txt&size=5").unwrap();
        let parts = vec![IncomingFile::new("a.txt", bytes_stream("hello".into()))];
        assert_eq!(
            body(dispatch(&registry, &upload, parts).await),
            r#"{"res":"ok","msg":null}"#
        );

        let download = parse_request("download?f=/a.txt").unwrap();
        assert!(dispatch(&registry, &download, Vec::new()).await.is_stream());

        let missing = parse_request("download?f=/b.txt").unwrap();
        let reply = body(dispatch(&registry, &missing, Vec::new()).await);
        assert!(reply.contains(r#""code":"not_found""#));
    }
}
