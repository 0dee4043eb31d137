use crate::error::{OpnError, Result};
use log::debug;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

const MIME_XATTR: &str = "user.mime";

/// MIME type stored in the `user.mime` extended attribute, if any.
pub fn xattr_mime(path: &Path) -> Option<String> {
    match xattr::get(path, MIME_XATTR) {
        Ok(Some(value)) => {
            let mime = String::from_utf8_lossy(&value).trim().to_string();
            (!mime.is_empty()).then_some(mime)
        }
        Ok(None) => None,
        Err(e) => {
            debug!("Could not read {} of {:?}: {}", MIME_XATTR, path, e);
            None
        }
    }
}

/// Asks `xdg-mime` for the MIME type, falling back to `file` when
/// `xdg-mime` is not installed.
pub fn file_mime(path: &Path) -> Result<String> {
    let detection_error = |message: String| OpnError::MimeDetection {
        path: path.to_path_buf(),
        message,
    };

    match Command::new("xdg-mime")
        .args(["query", "filetype"])
        .arg(path)
        .output()
    {
        Ok(output) if output.status.success() => {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        // See Exit Codes in xdg-mime(1)
        Ok(output) if output.status.code() == Some(2) => {
            return Err(detection_error("file does not exist".to_string()));
        }
        Ok(output) => {
            return Err(detection_error(format!(
                "xdg-mime exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("xdg-mime not found, falling back to file");
        }
        Err(e) => return Err(detection_error(e.to_string())),
    }

    let output = Command::new("file")
        .args(["-E", "--brief", "--dereference", "--mime-type"])
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => detection_error(
                "no programs to determine MIME type are installed. \
                 Either xdg-mime (xdg-utils) or file is required"
                    .to_string(),
            ),
            _ => detection_error(e.to_string()),
        })?;

    if !output.status.success() {
        return Err(detection_error(format!(
            "file exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stdout).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Strips parameters from a `Content-Type` header value.
pub fn content_type_mime(header: &str) -> Option<String> {
    let mime = header.split(';').next()?.trim().to_lowercase();
    (!mime.is_empty()).then_some(mime)
}
