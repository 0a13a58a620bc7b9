//! Template application.

use async_recursion::async_recursion;
use landit_core::{Error, Result};
use std::path::Path;

/// Copy the template directory `src` over `dst`, overwriting files that
/// already exist. Returns the number of files copied.
pub async fn apply_template(src: &Path, dst: &Path) -> Result<u64> {
    if !tokio::fs::try_exists(src).await? {
        return Err(Error::Configuration(format!(
            "template not found: {}",
            src.display()
        )));
    }
    copy_dir(src, dst).await
}

#[async_recursion]
async fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    tokio::fs::create_dir_all(dst).await?;
    let mut copied = 0;
    let mut entries = tokio::fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            copied += copy_dir(&entry.path(), &target).await?;
        } else if file_type.is_file() {
            tokio::fs::copy(entry.path(), &target).await?;
            copied += 1;
        }
    }
    Ok(copied)
}
