//! Record catalog - thêm, đọc, tìm kiếm investor records

use crate::error::{GateError, GateResult};
use crate::services::ServiceContext;
use creditgate_core::{CoreError, Record, RecordFilter, RecordPage};
use creditgate_persistence::RecordRepo;

/// Catalog Service - read-mostly access to the `records` table
pub struct CatalogService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CatalogService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn add(&self, record: &Record) -> GateResult<()> {
        if record.id.trim().is_empty() {
            return Err(CoreError::ValidationError("record id must not be empty".to_string()).into());
        }
        RecordRepo::insert(self.ctx.pool(), record).await?;
        tracing::info!(record = %record.id, "record added to catalog");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> GateResult<Record> {
        let row = RecordRepo::get(self.ctx.pool(), id).await.map_err(|e| {
            if e.is_not_found() {
                GateError::RecordNotFound(id.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(Record::try_from(row)?)
    }

    pub async fn search(&self, filter: &RecordFilter) -> GateResult<RecordPage> {
        let (rows, total_count) = RecordRepo::search(self.ctx.pool(), filter).await?;
        let records = rows
            .into_iter()
            .map(Record::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordPage {
            records,
            total_count,
        })
    }
}
