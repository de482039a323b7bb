//! Request parsing
//!
//! A request is one line, `action?key=value&...`, with a form-urlencoded
//! query. Uploads list their parts as repeated `name`/`size` pairs; the part
//! bodies follow the line back to back.

use url::form_urlencoded;

use crate::error::RequestError;
use crate::protocol::commands::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub action: Action,
    params: Vec<(String, String)>,
}

/// Declared upload part: client file name and exact body length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub name: String,
    pub size: u64,
}

impl Request {
    /// First value of `key`, if present
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, key: &'static str) -> Result<&str, RequestError> {
        match self.param(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(RequestError::MissingParameter(key)),
        }
    }

    pub fn profile(&self) -> Option<&str> {
        self.param("profile")
    }

    /// Optional unsigned number; empty counts as absent
    pub fn number(&self, key: &str) -> Result<Option<u32>, RequestError> {
        match self.param(key).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| RequestError::InvalidParameter(format!("{}={}", key, raw))),
        }
    }

    /// Upload parts in declaration order. Every `name` must be followed by
    /// its `size`.
    pub fn upload_parts(&self) -> Result<Vec<UploadPart>, RequestError> {
        let mut parts = Vec::new();
        let mut pending: Option<String> = None;

        for (key, value) in &self.params {
            match key.as_str() {
                "name" => {
                    if let Some(name) = pending.replace(value.clone()) {
                        return Err(RequestError::InvalidParameter(format!(
                            "no size for part {}",
                            name
                        )));
                    }
                }
                "size" => {
                    let name = pending
                        .take()
                        .ok_or_else(|| RequestError::InvalidParameter("size without name".into()))?;
                    let size = value
                        .trim()
                        .parse()
                        .map_err(|_| RequestError::InvalidParameter(format!("size={}", value)))?;
                    parts.push(UploadPart { name, size });
                }
                _ => {}
            }
        }

        if let Some(name) = pending {
            return Err(RequestError::InvalidParameter(format!(
                "no size for part {}",
                name
            )));
        }
        Ok(parts)
    }
}

/// Parses one request line into an action and its parameters.
pub fn parse_request(line: &str) -> Result<Request, RequestError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let (name, query) = trimmed.split_once('?').unwrap_or((trimmed, ""));

    let action = Action::from_name(name).ok_or_else(|| RequestError::UnknownAction(name.to_string()))?;
    let params = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok(Request { action, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_and_decoded_query() {
        let request = parse_request("RENAMEFILE?f=%2Fdocs%2Fa+b.txt&n=c.txt\r\n").unwrap();
        assert_eq!(request.action, Action::RenameFile);
        assert_eq!(request.param("f"), Some("/docs/a b.txt"));
        assert_eq!(request.require("n").unwrap(), "c.txt");
        assert_eq!(request.profile(), None);
    }

    #[test]
    fn only_the_line_terminator_is_stripped() {
        let request = parse_request("deletefile?f=%20padded%20.txt%20\r\n").unwrap();
        assert_eq!(request.require("f").unwrap(), " padded .txt ");
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(matches!(
            parse_request("format?d=/"),
            Err(RequestError::UnknownAction(name)) if name == "format"
        ));
    }

    #[test]
    fn blank_required_parameter_is_missing() {
        let request = parse_request("deletefile?f=").unwrap();
        assert!(matches!(
            request.require("f"),
            Err(RequestError::MissingParameter("f"))
        ));
    }

    #[test]
    fn thumbnail_dimensions_are_optional_numbers() {
        let request = parse_request("thumb?f=/a.png&width=120&height=").unwrap();
        assert_eq!(request.number("width").unwrap(), Some(120));
        assert_eq!(request.number("height").unwrap(), None);

        let bad = parse_request("thumb?f=/a.png&width=wide").unwrap();
        assert!(bad.number("width").is_err());
    }

    #[test]
    fn upload_parts_pair_names_with_sizes() {
        let request = parse_request("upload?d=/in&name=a.txt&size=3&name=b.txt&size=0").unwrap();
        assert_eq!(
            request.upload_parts().unwrap(),
            vec![
                UploadPart { name: "a.txt".into(), size: 3 },
                UploadPart { name: "b.txt".into(), size: 0 },
            ]
        );

        let dangling = parse_request("upload?d=/in&name=a.txt").unwrap();
        assert!(dangling.upload_parts().is_err());
    }
}
