use crate::constants::{CONVERTED_SUFFIX, VIDEO_EXTENSIONS};
use crate::formats::OutputFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Directory not found: {path}")]
    NotFound { path: String },
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub struct FileService;

impl FileService {
    pub fn extension_lowercase(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn is_video_file(path: &Path) -> bool {
        Self::extension_lowercase(path)
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
    }

    /// `<dir>/<stem>_converted.<ext>` next to the input.
    pub fn default_output_path(input: &Path, format: OutputFormat) -> Option<PathBuf> {
        let stem = input.file_stem()?;
        let name = format!(
            "{}{}.{}",
            stem.to_string_lossy(),
            CONVERTED_SUFFIX,
            format.extension()
        );
        Some(input.with_file_name(name))
    }

    pub fn with_format_extension(output: &Path, format: OutputFormat) -> PathBuf {
        output.with_extension(format.extension())
    }

    /// Recognized video files directly inside `dir`, sorted by name.
    pub async fn collect_video_files(dir: &Path) -> Result<Vec<PathBuf>, FileError> {
        if !tokio::fs::try_exists(dir)
            .await
            .map_err(|e| FileError::io(dir, e))?
        {
            return Err(FileError::NotFound {
                path: dir.display().to_string(),
            });
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| FileError::io(dir, e))?;
        let mut files = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FileError::io(dir, e))?
        {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_file && Self::is_video_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Moves `from` to `to`, copying across filesystems when rename can't.
    pub async fn move_file(from: &Path, to: &Path) -> Result<(), FileError> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(rename_error) => {
                tracing::debug!(
                    "Rename {:?} -> {:?} failed ({}), falling back to copy",
                    from,
                    to,
                    rename_error
                );
                tokio::fs::copy(from, to)
                    .await
                    .map_err(|e| FileError::io(to, e))?;
                tokio::fs::remove_file(from)
                    .await
                    .map_err(|e| FileError::io(from, e))
            }
        }
    }

    pub async fn ensure_dir(dir: &Path) -> Result<(), FileError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| FileError::io(dir, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            FileService::default_output_path(Path::new("/videos/clip.avi"), OutputFormat::Mp4),
            Some(PathBuf::from("/videos/clip_converted.mp4"))
        );
        assert_eq!(
            FileService::default_output_path(Path::new("holiday.final.mov"), OutputFormat::Mkv),
            Some(PathBuf::from("holiday.final_converted.mkv"))
        );
    }

    #[test]
    fn test_with_format_extension() {
        assert_eq!(
            FileService::with_format_extension(Path::new("/out/clip_converted.mp4"), OutputFormat::Flv),
            PathBuf::from("/out/clip_converted.flv")
        );
    }

    #[test]
    fn test_is_video_file() {
        assert!(FileService::is_video_file(Path::new("a.mkv")));
        assert!(FileService::is_video_file(Path::new("B.MP4")));
        assert!(FileService::is_video_file(Path::new("stream.ts")));
        assert!(!FileService::is_video_file(Path::new("notes.txt")));
        assert!(!FileService::is_video_file(Path::new("mkv")));
    }

    #[tokio::test]
    async fn test_collect_video_files() {
        let dir = TempDir::new().unwrap();
        for name in ["b.mkv", "a.AVI", "readme.txt", "c.webm"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.mkv")).unwrap();

        let files = FileService::collect_video_files(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.AVI", "b.mkv", "c.webm"]);
    }

    #[tokio::test]
    async fn test_collect_from_missing_dir() {
        let dir = TempDir::new().unwrap();
        let result = FileService::collect_video_files(&dir.path().join("missing")).await;
        assert!(matches!(result, Err(FileError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("clip.mkv");
        let to = dir.path().join("archive").join("clip.mkv");
        std::fs::write(&from, b"video").unwrap();
        FileService::ensure_dir(to.parent().unwrap()).await.unwrap();

        FileService::move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"video");
    }
}
