use std::collections::HashSet;
use std::path::{Path, PathBuf};

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StackError};
use crate::resources::{BucketHandle, DistributionHandle};
use crate::stack::Stack;

/// local site files that get pushed into the bucket after the stack is deployed,
/// followed by a cache invalidation on the distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDeployment {
    pub source_dir: PathBuf,
    pub bucket_logical_id: String,
    pub distribution_logical_id: String,
    pub distribution_paths: Vec<String>,
    /// delete objects in the bucket that don't exist locally
    pub prune: bool,
}

/// declares that `source_dir` should be uploaded into the bucket and `/*` invalidated.
/// the directory must exist at synthesis time.
pub fn add_content_deployment(
    stack: &mut Stack,
    bucket: &BucketHandle,
    distribution: &DistributionHandle,
    source_dir: &Path,
) -> Result<()> {
    if !source_dir.is_dir() {
        return Err(StackError::Configuration(format!(
            "Site asset directory {:?} does not exist or is not a directory", source_dir
        )));
    }
    let source_dir = source_dir.canonicalize()?;
    tracing::info!(
        source_dir = ?source_dir,
        bucket = bucket.logical_id(),
        distribution = distribution.logical_id(),
        "declaring content deployment"
    );
    stack.add_content_deployment(ContentDeployment {
        source_dir,
        bucket_logical_id: bucket.logical_id().to_string(),
        distribution_logical_id: distribution.logical_id().to_string(),
        distribution_paths: vec!["/*".into()],
        prune: true,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub path: PathBuf,
    /// object key: the path relative to the source dir, always `/` separated
    pub key: String,
}

fn iter_files_recursively(
    start_dir: &Path,
    callback: &mut impl FnMut(PathBuf) -> Result<()>,
) -> Result<()> {
    let readdir = std::fs::read_dir(start_dir)?;
    for entry in readdir {
        let direntry = entry?;
        let path = direntry.path();
        // follows symlinks, a linked directory is walked like a real one
        if std::fs::metadata(&path)?.is_dir() {
            iter_files_recursively(&path, callback)?;
        } else {
            callback(path)?;
        }
    }
    Ok(())
}

/// every file under `source_dir`, sorted by key
pub fn collect_site_files(source_dir: &Path) -> Result<Vec<SiteFile>> {
    let mut files = vec![];
    iter_files_recursively(source_dir, &mut |path| {
        let relative = path.strip_prefix(source_dir).map_err(|e| {
            StackError::Upload(format!("{:?} is not inside {:?}: {e}", path, source_dir))
        })?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(SiteFile { path, key });
        Ok(())
    })?;
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

pub fn content_type_for(path: &Path) -> mime::Mime {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let parsed = |s: &str| s.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM);
    match ext.as_str() {
        "html" | "htm" => mime::TEXT_HTML_UTF_8,
        "css" => mime::TEXT_CSS_UTF_8,
        "js" | "mjs" => mime::APPLICATION_JAVASCRIPT_UTF_8,
        "json" => mime::APPLICATION_JSON,
        "txt" => mime::TEXT_PLAIN_UTF_8,
        "xml" => mime::TEXT_XML,
        "csv" => mime::TEXT_CSV_UTF_8,
        "svg" => mime::IMAGE_SVG,
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "pdf" => mime::APPLICATION_PDF,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        "webp" => parsed("image/webp"),
        "ico" => parsed("image/x-icon"),
        "webmanifest" => parsed("application/manifest+json"),
        "wasm" => parsed("application/wasm"),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// remote keys that have no local counterpart
pub fn keys_to_prune(remote_keys: &[String], local: &[SiteFile]) -> Vec<String> {
    let local_keys: HashSet<&str> = local.iter().map(|f| f.key.as_str()).collect();
    remote_keys
        .iter()
        .filter(|k| !local_keys.contains(k.as_str()))
        .cloned()
        .collect()
}

pub async fn upload_files(s3: &aws_sdk_s3::Client, bucket: &str, files: &[SiteFile]) -> Result<()> {
    for file in files {
        let content_type = content_type_for(&file.path);
        let body = ByteStream::from_path(&file.path).await.map_err(|e| {
            StackError::Upload(format!("Failed to read {:?}\n{e}", file.path))
        })?;
        s3.put_object()
            .bucket(bucket)
            .key(&file.key)
            .content_type(content_type.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| StackError::Upload(format!("Failed to write {}\n{}", file.key, DisplayErrorContext(&e))))?;
        tracing::debug!(key = %file.key, content_type = %content_type, "uploaded");
    }
    Ok(())
}

pub async fn list_keys(s3: &aws_sdk_s3::Client, bucket: &str) -> Result<Vec<String>> {
    let mut keys = vec![];
    let mut continuation_token: Option<String> = None;
    loop {
        let page = s3.list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token.take())
            .send()
            .await
            .map_err(|e| StackError::Upload(format!("Failed to list {bucket}\n{}", DisplayErrorContext(&e))))?;
        keys.extend(page.contents().iter().filter_map(|o| o.key().map(|k| k.to_string())));
        match (page.is_truncated(), page.next_continuation_token()) {
            (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
            _ => break,
        }
    }
    Ok(keys)
}

pub async fn delete_keys(s3: &aws_sdk_s3::Client, bucket: &str, keys: &[String]) -> Result<()> {
    // delete_objects takes at most 1000 keys per request
    for chunk in keys.chunks(1000) {
        let objects = chunk
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StackError::Upload(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StackError::Upload(e.to_string()))?;
        s3.delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StackError::Upload(format!("Failed to prune {bucket}\n{}", DisplayErrorContext(&e))))?;
    }
    Ok(())
}

pub async fn invalidate(
    cloudfront: &aws_sdk_cloudfront::Client,
    distribution_id: &str,
    paths: &[String],
) -> Result<()> {
    use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};

    let paths = Paths::builder()
        .quantity(paths.len() as i32)
        .set_items(Some(paths.to_vec()))
        .build()
        .map_err(|e| StackError::Upload(e.to_string()))?;
    let batch = InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(uuid::Uuid::new_v4().to_string())
        .build()
        .map_err(|e| StackError::Upload(e.to_string()))?;
    let out = cloudfront.create_invalidation()
        .distribution_id(distribution_id)
        .invalidation_batch(batch)
        .send()
        .await
        .map_err(|e| StackError::Upload(format!(
            "Failed to invalidate {distribution_id}\n{}",
            aws_sdk_cloudfront::error::DisplayErrorContext(&e)
        )))?;
    tracing::info!(distribution_id, invalidation = ?out.invalidation().map(|i| i.id()), "created invalidation");
    Ok(())
}

impl ContentDeployment {
    /// uploads every local file, then prunes remote objects without a local counterpart.
    /// Returns the number of pruned objects.
    pub async fn sync_bucket(&self, s3: &aws_sdk_s3::Client, bucket_name: &str) -> Result<usize> {
        let files = collect_site_files(&self.source_dir)?;
        tracing::info!(files = files.len(), bucket = bucket_name, "uploading site contents");
        upload_files(s3, bucket_name, &files).await?;
        if !self.prune {
            return Ok(0);
        }
        let remote = list_keys(s3, bucket_name).await?;
        let stale = keys_to_prune(&remote, &files);
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), bucket = bucket_name, "pruning stale objects");
            delete_keys(s3, bucket_name, &stale).await?;
        }
        Ok(stale.len())
    }

    /// syncs the bucket and invalidates the distribution. `bucket_name` and `distribution_id`
    /// are the physical ids resolved from the deployed stack.
    pub async fn run(
        &self,
        s3: &aws_sdk_s3::Client,
        cloudfront: &aws_sdk_cloudfront::Client,
        bucket_name: &str,
        distribution_id: &str,
    ) -> Result<()> {
        self.sync_bucket(s3, bucket_name).await?;
        invalidate(cloudfront, distribution_id, &self.distribution_paths).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_relative_and_slash_separated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("blog/post")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(dir.path().join("blog/post/index.html"), "<h1>post</h1>").unwrap();
        std::fs::write(dir.path().join("blog/style.css"), "body {}").unwrap();
        let files = collect_site_files(dir.path()).unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["blog/post/index.html", "blog/style.css", "index.html"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_walked() {
        let dir = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        std::fs::write(shared.path().join("logo.svg"), "<svg/>").unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::os::unix::fs::symlink(shared.path(), dir.path().join("img")).unwrap();

        let files = collect_site_files(dir.path()).unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["img/logo.svg", "index.html"]);
    }

    #[test]
    fn guesses_common_content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), mime::TEXT_HTML_UTF_8);
        assert_eq!(content_type_for(Path::new("a/B.CSS")), mime::TEXT_CSS_UTF_8);
        assert_eq!(content_type_for(Path::new("favicon.ico")).to_string(), "image/x-icon");
        assert_eq!(content_type_for(Path::new("LICENSE")), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn prunes_only_remote_only_keys() {
        let local = vec![
            SiteFile { path: "index.html".into(), key: "index.html".into() },
            SiteFile { path: "a.css".into(), key: "a.css".into() },
        ];
        let remote = vec!["index.html".to_string(), "old.html".into(), "a.css".into(), "img/x.png".into()];
        assert_eq!(keys_to_prune(&remote, &local), vec!["old.html".to_string(), "img/x.png".into()]);
    }
}
