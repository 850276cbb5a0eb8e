use super::memory::MemoryDriver;
use crate::error::{PressDbError, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use tar::Archive;

/// Download a remote repository snapshot (a gzipped tarball, e.g. a GitHub
/// codeload URL) and unpack the subtree under `path` into an in-memory
/// mount. The download happens once at mount time, so an unreachable
/// repository fails fast and later reads never touch the network.
pub async fn snapshot(url: &str, path: &str) -> Result<MemoryDriver> {
    let bytes = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    unpack(&bytes, path)
}

/// Unpack the `path` subtree of a gzipped tarball. Tarballs produced by
/// repository hosts nest everything under one top-level directory, which is
/// stripped before matching.
pub fn unpack(bytes: &[u8], path: &str) -> Result<MemoryDriver> {
    let prefix = format!("{}/", path.trim_matches('/'));
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut driver = MemoryDriver::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path()?.to_string_lossy().replace('\\', "/");
        let Some((_, inner)) = entry_path.split_once('/') else {
            continue;
        };
        let Some(key) = inner.strip_prefix(&prefix) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        driver.insert(key.to_string(), bytes);
    }

    if driver.is_empty() {
        return Err(PressDbError::Config(format!(
            "Repository snapshot contains no files under '{path}'"
        )));
    }
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageDriver;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, contents.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[tokio::test]
    async fn unpacks_subtree_with_root_dir_stripped() {
        let bytes = tarball(&[
            ("repo-main/content/posts/hello.md", "# Hello"),
            ("repo-main/content/posts/sub/deep.md", "# Deep"),
            ("repo-main/README.md", "readme"),
        ]);
        let driver = unpack(&bytes, "content/posts").unwrap();
        assert_eq!(
            driver.keys().await.unwrap(),
            vec!["hello.md", "sub/deep.md"]
        );
        assert_eq!(driver.read("hello.md").await.unwrap(), b"# Hello");
    }

    #[test]
    fn empty_subtree_is_a_mount_error() {
        let bytes = tarball(&[("repo-main/README.md", "readme")]);
        assert!(unpack(&bytes, "content/posts").is_err());
    }
}
