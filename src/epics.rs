//! Protobuf messages of the Archiver Appliance PB format (`EPICSEvent.proto`).
//!
//! Each data line of a PB stream holds one of the sample messages below; the
//! chunk header is a [`PayloadInfo`] whose `type` selects which one.

use prost::encoding::{decode_key, skip_field, DecodeContext};
use prost::DecodeError;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldValue {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(string, required, tag = "2")]
    pub val: String,
}

/// Chunk header. `type` is kept as the raw tag so unknown values reach the
/// decoder instead of being silently defaulted; see [`PAYLOAD_INFO_REQUIRED`]
/// for the fields that must be on the wire.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PayloadInfo {
    #[prost(int32, required, tag = "1")]
    pub r#type: i32,
    #[prost(string, required, tag = "2")]
    pub pvname: String,
    #[prost(int32, required, tag = "3")]
    pub year: i32,
    #[prost(int32, optional, tag = "4")]
    pub element_count: Option<i32>,
    #[prost(message, repeated, tag = "15")]
    pub headers: Vec<FieldValue>,
}

/// Tags and names of the required `PayloadInfo` fields.
pub const PAYLOAD_INFO_REQUIRED: &[(u32, &str)] = &[(1, "type"), (2, "pvname"), (3, "year")];

const SCALAR_REQUIRED: &[(u32, &str)] = &[(1, "secondsintoyear"), (2, "nano"), (3, "val")];
const VECTOR_REQUIRED: &[(u32, &str)] = &[(1, "secondsintoyear"), (2, "nano")];

/// Name of the first `required` field with no occurrence in the encoded
/// message. prost decodes an absent required field as its default value.
pub fn missing_field(
    mut bytes: &[u8],
    required: &[(u32, &'static str)],
) -> Result<Option<&'static str>, DecodeError> {
    let mut seen = Vec::new();
    while !bytes.is_empty() {
        let (tag, wire_type) = decode_key(&mut bytes)?;
        skip_field(wire_type, tag, &mut bytes, DecodeContext::default())?;
        seen.push(tag);
    }
    Ok(required
        .iter()
        .find(|(tag, _)| !seen.contains(tag))
        .map(|(_, name)| *name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum PayloadType {
    ScalarString = 0,
    ScalarShort = 1,
    ScalarFloat = 2,
    ScalarEnum = 3,
    ScalarByte = 4,
    ScalarInt = 5,
    ScalarDouble = 6,
    WaveformString = 7,
    WaveformShort = 8,
    WaveformFloat = 9,
    WaveformEnum = 10,
    WaveformByte = 11,
    WaveformInt = 12,
    WaveformDouble = 13,
    V4GenericBytes = 14,
}

impl TryFrom<i32> for PayloadType {
    type Error = i32;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => PayloadType::ScalarString,
            1 => PayloadType::ScalarShort,
            2 => PayloadType::ScalarFloat,
            3 => PayloadType::ScalarEnum,
            4 => PayloadType::ScalarByte,
            5 => PayloadType::ScalarInt,
            6 => PayloadType::ScalarDouble,
            7 => PayloadType::WaveformString,
            8 => PayloadType::WaveformShort,
            9 => PayloadType::WaveformFloat,
            10 => PayloadType::WaveformEnum,
            11 => PayloadType::WaveformByte,
            12 => PayloadType::WaveformInt,
            13 => PayloadType::WaveformDouble,
            14 => PayloadType::V4GenericBytes,
            other => return Err(other),
        })
    }
}

impl PayloadType {
    pub fn is_waveform(&self) -> bool {
        (*self as i32) >= PayloadType::WaveformString as i32
            && *self != PayloadType::V4GenericBytes
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, PayloadType::ScalarEnum | PayloadType::WaveformEnum)
    }
}

/// Fields shared by every sample message.
pub trait EpicsSample: ::prost::Message + Default + Sized {
    type Value;

    /// Fields that must be present on the wire.
    const REQUIRED: &'static [(u32, &'static str)];

    fn seconds_into_year(&self) -> u32;
    fn nano(&self) -> u32;
    fn severity(&self) -> i32;
    fn status(&self) -> i32;
    fn into_val(self) -> Self::Value;
    fn from_parts(
        seconds_into_year: u32,
        nano: u32,
        val: Self::Value,
        severity: i32,
        status: i32,
    ) -> Self;
}

macro_rules! sample_message {
    ($name:ident, $val_ty:ty, [$($val_attr:tt)*], $required:expr) => {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct $name {
            #[prost(uint32, required, tag = "1")]
            pub secondsintoyear: u32,
            #[prost(uint32, required, tag = "2")]
            pub nano: u32,
            #[prost($($val_attr)*, tag = "3")]
            pub val: $val_ty,
            #[prost(int32, optional, tag = "4", default = "0")]
            pub severity: Option<i32>,
            #[prost(int32, optional, tag = "5", default = "0")]
            pub status: Option<i32>,
            #[prost(uint32, optional, tag = "6")]
            pub repeatcount: Option<u32>,
            #[prost(message, repeated, tag = "7")]
            pub fieldvalues: Vec<FieldValue>,
            #[prost(bool, optional, tag = "8", default = "false")]
            pub fieldactualchange: Option<bool>,
        }

        impl EpicsSample for $name {
            type Value = $val_ty;

            const REQUIRED: &'static [(u32, &'static str)] = $required;

            fn seconds_into_year(&self) -> u32 {
                self.secondsintoyear
            }

            fn nano(&self) -> u32 {
                self.nano
            }

            fn severity(&self) -> i32 {
                self.severity.unwrap_or(0)
            }

            fn status(&self) -> i32 {
                self.status.unwrap_or(0)
            }

            fn into_val(self) -> Self::Value {
                self.val
            }

            fn from_parts(
                seconds_into_year: u32,
                nano: u32,
                val: Self::Value,
                severity: i32,
                status: i32,
            ) -> Self {
                Self {
                    secondsintoyear: seconds_into_year,
                    nano,
                    val,
                    severity: Some(severity),
                    status: Some(status),
                    ..Default::default()
                }
            }
        }
    };
}

sample_message!(ScalarString, String, [string, required], SCALAR_REQUIRED);
sample_message!(ScalarShort, i32, [sint32, required], SCALAR_REQUIRED);
sample_message!(ScalarFloat, f32, [float, required], SCALAR_REQUIRED);
sample_message!(ScalarEnum, i32, [sint32, required], SCALAR_REQUIRED);
sample_message!(ScalarByte, Vec<u8>, [bytes = "vec", required], SCALAR_REQUIRED);
sample_message!(ScalarInt, i32, [sfixed32, required], SCALAR_REQUIRED);
sample_message!(ScalarDouble, f64, [double, required], SCALAR_REQUIRED);
sample_message!(VectorString, Vec<String>, [string, repeated], VECTOR_REQUIRED);
sample_message!(VectorShort, Vec<i32>, [sint32, repeated, packed = "true"], VECTOR_REQUIRED);
sample_message!(VectorFloat, Vec<f32>, [float, repeated, packed = "true"], VECTOR_REQUIRED);
sample_message!(VectorEnum, Vec<i32>, [sint32, repeated, packed = "true"], VECTOR_REQUIRED);
sample_message!(VectorChar, Vec<u8>, [bytes = "vec", required], SCALAR_REQUIRED);
sample_message!(VectorInt, Vec<i32>, [sfixed32, repeated, packed = "true"], VECTOR_REQUIRED);
sample_message!(VectorDouble, Vec<f64>, [double, repeated, packed = "true"], VECTOR_REQUIRED);
// userTag (field 9) is skipped on decode.
sample_message!(V4GenericBytes, Vec<u8>, [bytes = "vec", required], SCALAR_REQUIRED);
