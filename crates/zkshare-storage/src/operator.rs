//! OpenDAL Operator factory for zkshare object backends

use anyhow::{Context, Result};
use opendal::Operator;
use zkshare_core::config::{ObjectBackend, StorageConfig};

/// Build an operator for the configured backend.
///
/// `fs` roots objects under `root`; `s3` uses path-style addressing (the
/// opendal default), which MinIO and SeaweedFS require. If `enforce_tls` is
/// set, a plaintext HTTP S3 endpoint is an error; otherwise it only warns.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    let op = match cfg.backend {
        ObjectBackend::Memory => return memory_operator(),
        ObjectBackend::Fs => {
            std::fs::create_dir_all(&cfg.root)
                .with_context(|| format!("creating object root: {}", cfg.root))?;
            let builder = opendal::services::Fs::default().root(&cfg.root);
            Operator::new(builder)
                .context("creating OpenDAL fs operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .finish()
        }
        ObjectBackend::S3 => {
            check_endpoint_tls(cfg)?;
            let access_key_id = cfg
                .access_key_id
                .as_deref()
                .context("storage.access_key_id is required for the s3 backend")?;
            let secret_access_key = cfg
                .secret_access_key
                .as_deref()
                .context("storage.secret_access_key is required for the s3 backend")?;

            let builder = opendal::services::S3::default()
                .root(&cfg.root)
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .access_key_id(access_key_id)
                .secret_access_key(secret_access_key);

            Operator::new(builder)
                .context("creating OpenDAL S3 operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .layer(
                    opendal::layers::RetryLayer::new()
                        .with_max_times(5)
                        .with_jitter(),
                )
                .finish()
        }
    };
    Ok(op)
}

/// In-process backend for tests and the `memory` deployment
pub fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish())
}

fn check_endpoint_tls(cfg: &StorageConfig) -> Result<()> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                cfg.endpoint
            );
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; set storage.enforce_tls = true and use HTTPS in production"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3(endpoint: &str, enforce_tls: bool) -> StorageConfig {
        StorageConfig {
            backend: ObjectBackend::S3,
            endpoint: endpoint.into(),
            enforce_tls,
            access_key_id: Some("key".into()),
            secret_access_key: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_fs_operator() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            backend: ObjectBackend::Fs,
            root: dir.path().join("objects").to_string_lossy().into_owned(),
            ..Default::default()
        };
        assert!(build_operator(&cfg).is_ok());
        assert!(dir.path().join("objects").is_dir());
    }

    #[test]
    fn test_s3_http_allowed_without_enforce_tls() {
        assert!(build_operator(&s3("http://localhost:9000", false)).is_ok());
    }

    #[test]
    fn test_s3_http_rejected_with_enforce_tls() {
        let result = build_operator(&s3("http://insecure:9000", true));
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_s3_https_with_enforce_tls() {
        assert!(build_operator(&s3("https://s3.example.com", true)).is_ok());
    }

    #[test]
    fn test_s3_requires_credentials() {
        let cfg = StorageConfig {
            access_key_id: None,
            ..s3("https://s3.example.com", false)
        };
        let err = build_operator(&cfg).unwrap_err();
        assert!(err.to_string().contains("access_key_id"));
    }
}
