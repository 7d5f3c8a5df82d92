use crate::chunk::{Chunk, ChunkSplitter, Record};
use crate::data::ArchiveData;
use crate::decode_helpers::{timestamp_in_year, unescape};
use crate::epics::*;
use crate::error::{ArchiveError, Result};
use crate::types::*;
use prost::Message;
use tracing::{debug, Span};

/// Decoded `PayloadInfo` of one chunk. Every record of the chunk is decoded
/// against it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHeader {
    pub pv: String,
    pub value_type: PayloadType,
    pub year: i32,
    pub element_count: Option<i32>,
    pub headers: Vec<(String, String)>,
    enum_options: EnumOptions,
}

impl ChunkHeader {
    pub fn new(pv: impl Into<String>, value_type: PayloadType, year: i32) -> Self {
        Self {
            pv: pv.into(),
            value_type,
            year,
            element_count: None,
            headers: Vec::new(),
            enum_options: EnumOptions::default(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.enum_options = if self.value_type.is_enum() {
            EnumOptions::from_headers(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        } else {
            EnumOptions::default()
        };
        self.headers = headers;
        self
    }

    pub fn with_element_count(mut self, element_count: i32) -> Self {
        self.element_count = Some(element_count);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Enum labels, only for enum payload types.
    pub fn enum_options(&self) -> &EnumOptions {
        &self.enum_options
    }
}

impl From<&ChunkHeader> for PayloadInfo {
    fn from(header: &ChunkHeader) -> Self {
        PayloadInfo {
            r#type: header.value_type as i32,
            pvname: header.pv.clone(),
            year: header.year,
            element_count: header.element_count,
            headers: header
                .headers
                .iter()
                .map(|(name, val)| FieldValue {
                    name: name.clone(),
                    val: val.clone(),
                })
                .collect(),
        }
    }
}

pub fn decode_header(record: &Record<'_>) -> Result<ChunkHeader> {
    let bytes = unescape(record.bytes).map_err(|e| e.at_offset(record.offset))?;
    let info = PayloadInfo::decode(bytes.as_slice()).map_err(|e| {
        ArchiveError::format(record.offset, format!("cannot decode chunk header: {}", e))
    })?;
    require_fields(&bytes, PAYLOAD_INFO_REQUIRED, record.offset)?;
    let value_type = PayloadType::try_from(info.r#type).map_err(|tag| {
        ArchiveError::format(record.offset, format!("unknown payload type tag {}", tag))
    })?;

    let header = ChunkHeader::new(info.pvname, value_type, info.year).with_headers(
        info.headers
            .into_iter()
            .map(|field| (field.name, field.val))
            .collect(),
    );
    Ok(match info.element_count {
        Some(count) => header.with_element_count(count),
        None => header,
    })
}

pub fn decode_record(record: &Record<'_>, header: &ChunkHeader) -> Result<ArchiveEvent> {
    let bytes = unescape(record.bytes).map_err(|e| e.at_offset(record.offset))?;
    let sample = Sample {
        record,
        header,
        payload: bytes.as_slice(),
    };

    match header.value_type {
        PayloadType::ScalarString => {
            sample.decode::<ScalarString, _>(|v| Ok(ArchiveValue::String(v)))
        }
        PayloadType::ScalarShort => {
            sample.decode::<ScalarShort, _>(|v| Ok(ArchiveValue::Int(to_short(v)?.into())))
        }
        PayloadType::ScalarFloat => {
            sample.decode::<ScalarFloat, _>(|v| Ok(ArchiveValue::Double(v.into())))
        }
        PayloadType::ScalarEnum => sample.decode::<ScalarEnum, _>(|v| Ok(ArchiveValue::Enum(v))),
        PayloadType::ScalarByte => sample.decode::<ScalarByte, _>(|v| match v.as_slice() {
            [b] => Ok(ArchiveValue::Int(char_to_int(*b))),
            other => Err(ArchiveError::value(
                "val",
                format!("scalar byte holds {} bytes", other.len()),
            )),
        }),
        PayloadType::ScalarInt => sample.decode::<ScalarInt, _>(|v| Ok(ArchiveValue::Int(v))),
        PayloadType::ScalarDouble => {
            sample.decode::<ScalarDouble, _>(|v| Ok(ArchiveValue::Double(v)))
        }
        PayloadType::WaveformString => {
            sample.decode::<VectorString, _>(|v| Ok(ArchiveValue::StringArray(v)))
        }
        PayloadType::WaveformShort => sample.decode::<VectorShort, _>(|v| {
            let ints = v
                .into_iter()
                .map(|x| to_short(x).map(i32::from))
                .collect::<Result<Vec<_>>>()?;
            Ok(ArchiveValue::IntArray(ints))
        }),
        PayloadType::WaveformFloat => sample.decode::<VectorFloat, _>(|v| {
            Ok(ArchiveValue::DoubleArray(v.into_iter().map(f64::from).collect()))
        }),
        PayloadType::WaveformEnum => {
            sample.decode::<VectorEnum, _>(|v| Ok(ArchiveValue::EnumArray(v)))
        }
        PayloadType::WaveformByte => sample.decode::<VectorChar, _>(|v| {
            Ok(ArchiveValue::IntArray(v.into_iter().map(char_to_int).collect()))
        }),
        PayloadType::WaveformInt => {
            sample.decode::<VectorInt, _>(|v| Ok(ArchiveValue::IntArray(v)))
        }
        PayloadType::WaveformDouble => {
            sample.decode::<VectorDouble, _>(|v| Ok(ArchiveValue::DoubleArray(v)))
        }
        PayloadType::V4GenericBytes => {
            sample.decode::<V4GenericBytes, _>(|v| Ok(ArchiveValue::Bytes(v)))
        }
    }
}

/// One unescaped record and the header it is decoded against.
struct Sample<'a> {
    record: &'a Record<'a>,
    header: &'a ChunkHeader,
    payload: &'a [u8],
}

impl Sample<'_> {
    fn decode<M, F>(&self, convert: F) -> Result<ArchiveEvent>
    where
        M: EpicsSample,
        F: FnOnce(M::Value) -> Result<ArchiveValue>,
    {
        let offset = self.record.offset;
        let value_type = self.header.value_type;
        let sample = M::decode(self.payload).map_err(|e| {
            ArchiveError::format(offset, format!("cannot decode {:?} sample: {}", value_type, e))
        })?;
        require_fields(self.payload, M::REQUIRED, offset)?;

        let timestamp =
            timestamp_in_year(self.header.year, sample.seconds_into_year(), sample.nano())?;
        let severity = Severity::from(sample.severity());
        let status = sample.status();
        let value = convert(sample.into_val())?;

        ArchiveEvent::new(self.header.pv.clone(), timestamp, value, severity)
            .with_status(status)
            .with_enum_options(self.header.enum_options.clone())
    }
}

/// prost leaves absent `required` fields at their default, so presence is
/// checked on the wire.
fn require_fields(payload: &[u8], required: &[(u32, &'static str)], offset: usize) -> Result<()> {
    match missing_field(payload, required) {
        Ok(None) => Ok(()),
        Ok(Some(name)) => Err(ArchiveError::format(
            offset,
            format!("missing required field {}", name),
        )),
        Err(e) => Err(ArchiveError::format(offset, e.to_string())),
    }
}

/// EPICS chars are signed.
fn char_to_int(b: u8) -> i32 {
    i32::from(b as i8)
}

fn to_short(v: i32) -> Result<i16> {
    i16::try_from(v)
        .map_err(|_| ArchiveError::value("val", format!("{} is out of range for a short", v)))
}

/// Decodes whole PB streams. Log events are emitted under the supplied span.
#[derive(Debug, Clone)]
pub struct Decoder {
    span: Span,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self { span: Span::none() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn decode_chunk(&self, chunk: &Chunk<'_>) -> Result<ArchiveData> {
        let header = decode_header(&chunk.header)?;
        let events = chunk
            .records
            .iter()
            .map(|record| decode_record(record, &header))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            parent: &self.span,
            pv = %header.pv,
            year = header.year,
            value_type = ?header.value_type,
            records = events.len(),
            "decoded chunk"
        );

        ArchiveData::from_events(header.pv, events)
    }

    /// Decodes every chunk of `raw` and joins them in stream order under `pv`.
    pub fn decode_stream(&self, raw: &[u8], pv: &str) -> Result<ArchiveData> {
        let parts = ChunkSplitter::new(raw)
            .map(|chunk| self.decode_chunk(&chunk).map(|data| data.with_pv(pv)))
            .collect::<Result<Vec<_>>>()?;

        if parts.is_empty() {
            return Ok(ArchiveData::empty(pv));
        }
        ArchiveData::concatenate(&parts)
    }
}

/// Decodes a complete PB stream, such as a `.pb` file or a `getData.raw` body.
pub fn parse_pb_data(raw: &[u8], pv: &str) -> Result<ArchiveData> {
    Decoder::new().decode_stream(raw, pv)
}
