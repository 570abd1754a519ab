use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use uuid::Uuid;

use crate::err::Error;

pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;
pub const URL_PREFIX: &str = "/uploads";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub path: String,
}

/// Certificate images on local disk, laid out as `<root>/<bucket>/<owner>/<file>`.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
    bucket: String,
}

pub fn accepted_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type == "application/pdf"
}

pub fn content_type_for(path: &str) -> &'static str {
    match extension_of(path).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

impl AttachmentStore {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, bucket: S) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub async fn prepare(&self) -> std::io::Result<()> {
        create_dir_all(self.root.join(&self.bucket)).await
    }

    /// Rejects anything that could step outside the upload root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, Error> {
        let path = Path::new(relative);
        let clean = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !clean || relative.is_empty() {
            return Err(Error::not_found("Arquivo não encontrado"));
        }
        Ok(self.root.join(path))
    }

    /// Owner segment of a stored path, `None` when the path is not in this bucket.
    pub fn owner_of<'a>(&self, relative: &'a str) -> Option<&'a str> {
        let mut parts = relative.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(bucket), Some(owner), Some(_file), None) if bucket == self.bucket => Some(owner),
            _ => None,
        }
    }

    pub async fn save(
        &self,
        owner: &str,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile, Error> {
        let ext = file_name
            .and_then(extension_of)
            .unwrap_or_else(|| "jpg".to_string());
        let relative = format!("{}/{}/{}.{}", self.bucket, owner, Uuid::new_v4(), ext);
        let target = self.resolve(&relative)?;
        if let Some(parent) = target.parent() {
            create_dir_all(parent).await?;
        }

        let mut writer = BufWriter::new(File::create(&target).await?);
        writer.write_all(bytes).await?;
        writer.flush().await?;

        log::info!("Stored attachment {} ({} bytes)", relative, bytes.len());
        Ok(StoredFile {
            url: format!("{}/{}", URL_PREFIX, relative),
            path: relative,
        })
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, Error> {
        let path = self.resolve(relative)?;
        if !path.is_file() {
            return Err(Error::not_found("Arquivo não encontrado"));
        }
        let mut bytes = Vec::new();
        BufReader::new(File::open(path).await?)
            .read_to_end(&mut bytes)
            .await?;
        Ok(bytes)
    }

    pub async fn remove(&self, relative: &str) -> Result<(), Error> {
        let path = self.resolve(relative)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}
