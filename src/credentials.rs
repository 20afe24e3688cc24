use log::{info, warn};
use std::fs;
use std::path::Path;

use crate::error::{DigestError, Result};

/// Value some users leave in the file from the setup instructions.
const PLACEHOLDER_KEY: &str = "YOUR_API_KEY";

/// Read the API key from `path`.
///
/// A missing file is created empty so the user knows where the key goes;
/// missing, empty and placeholder keys all come back as
/// [`DigestError::MissingCredential`].
pub fn load_api_key(path: &Path) -> Result<String> {
    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, "")?;
        info!("Created empty credential file at {:?}", path);
        return Err(DigestError::MissingCredential {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)?;
    let key = content.lines().next().unwrap_or("").trim();
    if key.is_empty() || key == PLACEHOLDER_KEY {
        warn!("Credential file {:?} does not contain an API key", path);
        return Err(DigestError::MissingCredential {
            path: path.to_path_buf(),
        });
    }

    Ok(key.to_string())
}
