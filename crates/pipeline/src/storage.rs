use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

/// Byte storage keyed by opaque string. The pipeline reads transcription
/// artifacts; the HTTP boundary writes uploaded audio.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<()>;

    /// URI of the object as the transcription engine expects it.
    fn media_uri(&self, key: &str) -> String;
}

pub struct S3ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let data = object.body.collect().await?.into_bytes();
        debug!(key, bytes = data.len(), "fetched object");
        Ok(data.to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await?;
        debug!(key, "stored object");
        Ok(())
    }

    fn media_uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
