use crate::error::FileError;
use crate::models::sheet::PageInput;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 从文件夹中加载所有扫描页（按文件名排序，页码从 1 开始）
///
/// 这里只读取字节，解码在批次的解码阶段进行
pub async fn load_page_folder(folder_path: &str) -> Result<Vec<PageInput>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_page_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut pages = Vec::with_capacity(paths.len());
    for (idx, path) in paths.iter().enumerate() {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("无法读取图像文件: {}", path.display()))?;
        pages.push(PageInput::Encoded {
            page_number: idx as u32 + 1,
            bytes,
        });
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_image_extensions_are_pages() {
        assert!(is_page_image(Path::new("scan_001.PNG")));
        assert!(is_page_image(Path::new("a/b/page.jpeg")));
        assert!(!is_page_image(Path::new("notes.toml")));
        assert!(!is_page_image(Path::new("no_extension")));
    }

    #[tokio::test]
    async fn test_missing_folder_is_an_error() {
        assert!(load_page_folder("/definitely/not/here").await.is_err());
    }
}
