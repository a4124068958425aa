//! Binary (`.protobin`) record format.
//!
//! The format is a protocol-buffer encoding of one container message per
//! record kind:
//!
//! ```text
//! message PredictedInstance { int64 id = 1; string label = 2; int64 functionId = 3; double value = 4; }
//! message PredictedInstances { repeated PredictedInstance predictedInstance = 1; }
//! message ObservedInstance  { int64 id = 1; string label = 2; bool value = 3; }
//! message ObservedInstances { repeated ObservedInstance observedInstance = 1; }
//! message ErrorRate         { string label = 1; int64 functionId = 2; double value = 3; }
//! message ErrorRates        { repeated ErrorRate errorRate = 1; }
//! ```
//!
//! Each record is a length-delimited submessage of field 1 of the container.
//! Encoding is deterministic for a given record order. Decoding walks the
//! container field by field so that a corrupt record can be reported by its
//! byte offset; unknown fields at either level are skipped.

use std::fs;
use std::path::Path;

use prost::Message;

use super::{ErrorRate, Label, ObservedInstance, PredictedInstance};
use crate::error::LabelFuseError;

// ============================================================================
// Schema
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct PredictedInstanceMessage {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub label: String,
    #[prost(int64, tag = "3")]
    pub function_id: i64,
    #[prost(double, tag = "4")]
    pub value: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PredictedInstancesMessage {
    #[prost(message, repeated, tag = "1")]
    pub predicted_instance: Vec<PredictedInstanceMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ObservedInstanceMessage {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub label: String,
    #[prost(bool, tag = "3")]
    pub value: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ObservedInstancesMessage {
    #[prost(message, repeated, tag = "1")]
    pub observed_instance: Vec<ObservedInstanceMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorRateMessage {
    #[prost(string, tag = "1")]
    pub label: String,
    #[prost(int64, tag = "2")]
    pub function_id: i64,
    #[prost(double, tag = "3")]
    pub value: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorRatesMessage {
    #[prost(message, repeated, tag = "1")]
    pub error_rate: Vec<ErrorRateMessage>,
}

/// Field number of the repeated record field in every container message.
const RECORDS_FIELD: u64 = 1;

/// A record kind with a protocol-buffer representation.
pub trait ProtobinRecord: Sized {
    type Message: Message + Default;
    type Container: Message + Default;

    fn to_message(&self) -> Self::Message;
    fn from_message(message: Self::Message) -> Self;
    fn container(messages: Vec<Self::Message>) -> Self::Container;
}

impl ProtobinRecord for PredictedInstance {
    type Message = PredictedInstanceMessage;
    type Container = PredictedInstancesMessage;

    fn to_message(&self) -> Self::Message {
        PredictedInstanceMessage {
            id: self.id,
            label: self.label.name().to_string(),
            function_id: self.source_id,
            value: self.value,
        }
    }

    fn from_message(message: Self::Message) -> Self {
        PredictedInstance::new(
            message.id,
            Label::from(message.label),
            message.function_id,
            message.value,
        )
    }

    fn container(messages: Vec<Self::Message>) -> Self::Container {
        PredictedInstancesMessage {
            predicted_instance: messages,
        }
    }
}

impl ProtobinRecord for ObservedInstance {
    type Message = ObservedInstanceMessage;
    type Container = ObservedInstancesMessage;

    fn to_message(&self) -> Self::Message {
        ObservedInstanceMessage {
            id: self.id,
            label: self.label.name().to_string(),
            value: self.value,
        }
    }

    fn from_message(message: Self::Message) -> Self {
        ObservedInstance::new(message.id, Label::from(message.label), message.value)
    }

    fn container(messages: Vec<Self::Message>) -> Self::Container {
        ObservedInstancesMessage {
            observed_instance: messages,
        }
    }
}

impl ProtobinRecord for ErrorRate {
    type Message = ErrorRateMessage;
    type Container = ErrorRatesMessage;

    fn to_message(&self) -> Self::Message {
        ErrorRateMessage {
            label: self.label.name().to_string(),
            function_id: self.source_id,
            value: self.value,
        }
    }

    fn from_message(message: Self::Message) -> Self {
        ErrorRate::new(Label::from(message.label), message.function_id, message.value)
    }

    fn container(messages: Vec<Self::Message>) -> Self::Container {
        ErrorRatesMessage {
            error_rate: messages,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Encodes records into the binary container format.
pub fn to_protobin_bytes<R: ProtobinRecord>(records: &[R]) -> Vec<u8> {
    let messages = records.iter().map(ProtobinRecord::to_message).collect();
    R::container(messages).encode_to_vec()
}

/// Decodes records from binary container bytes.
pub fn from_protobin_slice<R: ProtobinRecord>(bytes: &[u8]) -> Result<Vec<R>, LabelFuseError> {
    decode_records(bytes, Path::new("<bytes>"))
}

/// Writes records to a `.protobin` file.
pub fn write_protobin<R: ProtobinRecord>(path: &Path, records: &[R]) -> Result<(), LabelFuseError> {
    fs::write(path, to_protobin_bytes(records)).map_err(LabelFuseError::Io)
}

/// Reads records from a `.protobin` file.
pub fn read_protobin<R: ProtobinRecord>(path: &Path) -> Result<Vec<R>, LabelFuseError> {
    let bytes = fs::read(path).map_err(LabelFuseError::Io)?;
    decode_records(&bytes, path)
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_records<R: ProtobinRecord>(bytes: &[u8], path: &Path) -> Result<Vec<R>, LabelFuseError> {
    let malformed = |offset: usize, message: String| LabelFuseError::MalformedRecord {
        path: path.to_path_buf(),
        location: format!("byte offset {}", offset),
        message,
    };

    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let field_offset = offset;
        let key = read_varint(bytes, &mut offset).map_err(|e| malformed(field_offset, e))?;
        let field = key >> 3;
        let wire_type = key & 0x7;
        if field == 0 {
            return Err(malformed(field_offset, "invalid field number 0".to_string()));
        }

        match wire_type {
            // varint
            0 => {
                read_varint(bytes, &mut offset).map_err(|e| malformed(field_offset, e))?;
            }
            // fixed64
            1 => advance(bytes, &mut offset, 8).map_err(|e| malformed(field_offset, e))?,
            // length-delimited
            2 => {
                let len = read_varint(bytes, &mut offset).map_err(|e| malformed(field_offset, e))?;
                let len = usize::try_from(len)
                    .map_err(|_| malformed(field_offset, format!("length {} too large", len)))?;
                let start = offset;
                advance(bytes, &mut offset, len).map_err(|e| malformed(field_offset, e))?;

                if field == RECORDS_FIELD {
                    let message = R::Message::decode(&bytes[start..offset]).map_err(|e| {
                        malformed(field_offset, format!("record {}: {}", records.len(), e))
                    })?;
                    records.push(R::from_message(message));
                }
            }
            // fixed32
            5 => advance(bytes, &mut offset, 4).map_err(|e| malformed(field_offset, e))?,
            other => {
                return Err(malformed(
                    field_offset,
                    format!("unsupported wire type {} for field {}", other, field),
                ));
            }
        }
    }

    Ok(records)
}

fn read_varint(bytes: &[u8], offset: &mut usize) -> Result<u64, String> {
    let mut cursor = &bytes[*offset..];
    let value = prost::encoding::decode_varint(&mut cursor).map_err(|e| e.to_string())?;
    *offset = bytes.len() - cursor.len();
    Ok(value)
}

fn advance(bytes: &[u8], offset: &mut usize, len: usize) -> Result<(), String> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| format!("field of {} byte(s) runs past end of input", len))?;
    *offset = end;
    Ok(())
}
