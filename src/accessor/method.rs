use thiserror::Error;

use super::entity::{RecordId, Tuple};
use crate::buffer::manager::{self, BufferPoolManager};
use crate::storage::entity::TableId;
use crate::tx::TransactionId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("table {0} is not registered")]
    UnknownTable(TableId),
    #[error("encoded tuple takes {size} bytes but a slot holds {slot}")]
    TupleTooLarge { size: usize, slot: usize },
    #[error("{tuple_size}-byte tuples do not fit a {page_size}-byte page")]
    SlotTooLarge { tuple_size: usize, page_size: usize },
    #[error("no tuple at {0}")]
    NoSuchTuple(RecordId),
    #[error("tuple has no record id")]
    MissingRecordId,
    #[error(transparent)]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Buffer(#[from] manager::Error),
}

impl Error {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Buffer(err) if err.is_aborted())
    }
}

pub trait Iterable {
    fn next(&mut self, bufmgr: &dyn BufferPoolManager) -> Result<Option<Tuple>, Error>;
}

/// Storage of one table's tuples on pages obtained through the buffer pool.
pub trait TableFile: Send + Sync {
    fn table_id(&self) -> TableId;
    fn insert_tuple(
        &self,
        bufmgr: &dyn BufferPoolManager,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<RecordId, Error>;
    fn delete_tuple(
        &self,
        bufmgr: &dyn BufferPoolManager,
        tid: TransactionId,
        record_id: RecordId,
    ) -> Result<(), Error>;
    fn scan(&self, tid: TransactionId) -> Box<dyn Iterable>;
}
