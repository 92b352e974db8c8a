use std::fmt;

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::method::Error;
use crate::storage::entity::PageId;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: u16,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    // Where the tuple is stored; None until inserted
    pub record_id: Option<RecordId>,
    pub fields: Vec<Field>,
}

// Fixed-width integers; slots are zero padded past the encoding
fn codec() -> impl Options {
    bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            record_id: None,
            fields,
        }
    }

    pub fn encoded_size(&self) -> Result<usize, Error> {
        Ok(codec().serialized_size(&self.fields)? as usize)
    }

    pub fn encode_into(&self, slot: &mut [u8]) -> Result<(), Error> {
        let size = self.encoded_size()?;
        if size > slot.len() {
            return Err(Error::TupleTooLarge {
                size,
                slot: slot.len(),
            });
        }
        let (body, padding) = slot.split_at_mut(size);
        codec().serialize_into(body, &self.fields)?;
        padding.iter_mut().for_each(|byte| *byte = 0);
        Ok(())
    }

    pub fn decode(slot: &[u8], record_id: RecordId) -> Result<Self, Error> {
        let fields = codec().deserialize(slot)?;
        Ok(Self {
            record_id: Some(record_id),
            fields,
        })
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        match self.fields.get(index) {
            Some(Field::Int(value)) => Some(*value),
            _ => None,
        }
    }
}
