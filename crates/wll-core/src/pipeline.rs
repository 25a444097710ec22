use anyhow::Result;

use crate::Record;

/// Consumer of mapped records (the host application's persistence side)
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    async fn emit(&mut self, record: &Record) -> Result<()>;
}
