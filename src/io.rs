use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::fs::{create_dir_all, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::err::Error;

pub const AVATAR_DIR: &str = "avatar";

/// `{basename}_{DD_MM_YYYY}.{ext}`, where `basename` runs up to the first dot
/// and `ext` starts after the last one. Directory parts of `original` are dropped.
pub fn avatar_file_name(original: &str, date: NaiveDate) -> String {
    let file = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original);
    let stamp = date.format("%d_%m_%Y");
    match (file.split_once('.'), file.rsplit_once('.')) {
        (Some((base, _)), Some((_, ext))) => format!("{}_{}.{}", base, stamp, ext),
        _ => format!("{}_{}", file, stamp),
    }
}

fn with_suffix(file_name: &str, suffix: &str) -> String {
    match file_name.split_once('.') {
        Some((base, rest)) => format!("{}_{}.{}", base, suffix, rest),
        None => format!("{}_{}", file_name, suffix),
    }
}

fn random_suffix() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect()
}

/// Directory that uploaded files are written under.
#[derive(Debug, Clone)]
pub struct MediaRoot {
    root: PathBuf,
}

impl MediaRoot {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub async fn prepare(&self) -> Result<(), Error> {
        create_dir_all(self.root.join(AVATAR_DIR)).await?;
        Ok(())
    }

    /// Writes an uploaded avatar and returns its media-relative path.
    /// An existing file of the same name is never overwritten.
    pub async fn store_avatar(
        &self,
        original_name: &str,
        bytes: &[u8],
        date: NaiveDate,
    ) -> Result<String, Error> {
        self.prepare().await?;
        let mut file_name = avatar_file_name(original_name, date);
        for _ in 0..8 {
            let relative = format!("{}/{}", AVATAR_DIR, file_name);
            match create_io_file(self.root.join(&relative)).await {
                Ok(file) => {
                    let mut writer = BufWriter::new(file);
                    writer.write_all(bytes).await?;
                    writer.flush().await?;
                    log::debug!("stored avatar {}", relative);
                    return Ok(relative);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let base = avatar_file_name(original_name, date);
                    file_name = with_suffix(&base, &random_suffix());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(Error::InternalError {
            kind: "IOError",
            message: format!("no free file name for avatar {:?}", original_name),
        })
    }

    /// Reads a file stored under the avatar directory.
    pub async fn read_avatar(&self, file_name: &str) -> Result<Vec<u8>, Error> {
        if file_name.is_empty()
            || file_name.contains(|c: char| c == '/' || c == '\\')
            || file_name.starts_with('.')
        {
            return Err(Error::item_not_found());
        }
        read_io_file(self.root.join(AVATAR_DIR).join(file_name)).await
    }

    pub async fn remove(&self, relative: &str) -> Result<(), Error> {
        tokio::fs::remove_file(self.root.join(relative)).await?;
        Ok(())
    }
}

async fn create_io_file(path: PathBuf) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

async fn read_io_file(path: PathBuf) -> Result<Vec<u8>, Error> {
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(Error::item_not_found()),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes).await?;
    Ok(bytes)
}
