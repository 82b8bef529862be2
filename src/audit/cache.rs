//! Reader for the label cache the Ultralytics trainer leaves next to each
//! label split (`labels/<split>.cache`).
//!
//! The file is a NumPy `.npy` holding a 0-d object array, i.e. a pickle of
//! an `ndarray` whose state wraps the cache dict. Only the subset of the
//! pickle machine needed to rebuild plain containers is implemented;
//! foreign objects are kept as opaque [`PickleValue::Object`] nodes so the
//! dict can still be found inside them.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::label::file_name;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// Larger files are refused rather than read into memory.
const MAX_CACHE_BYTES: u64 = 512 * 1024 * 1024;
/// Keys that identify the trainer's cache dict.
const CACHE_KEYS: [&str; 6] = ["msgs", "labels", "hash", "results", "nf", "nl"];

/// Why a cache file could not be read.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is {size} bytes, larger than the {limit} byte limit", limit = MAX_CACHE_BYTES)]
    TooLarge { size: u64 },

    #[error("not a .npy file: {0}")]
    NotNpy(String),

    #[error("expected an object array, found descr {0}")]
    NotObjectArray(String),

    #[error("pickle error at byte {offset}: {message}")]
    Pickle { offset: usize, message: String },

    #[error("no cache dict found in pickle payload")]
    NoDict,
}

/// Result of looking at one split's cache file.
#[derive(Clone, Debug, Serialize)]
pub struct CacheSummary {
    pub file: String,
    pub status: CacheStatus,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheStatus {
    NotFound,
    Unreadable { message: String },
    Loaded(CacheContents),
}

/// Fields of interest from the cache dict.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheContents {
    pub nf: Option<i64>,
    pub nl: Option<i64>,
    pub results: Option<CacheResults>,
    pub version: Option<String>,
    /// Number of per-image label records.
    pub label_records: Option<usize>,
    pub msgs: Vec<String>,
}

/// The trainer's `(found, missing, empty, corrupt, total)` counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CacheResults {
    pub found: i64,
    pub missing: i64,
    pub empty: i64,
    pub corrupt: i64,
    pub total: i64,
}

/// Inspects a cache file, folding every failure into the returned status.
pub fn inspect_cache(path: &Path) -> CacheSummary {
    let file = file_name(path);
    let status = if !path.is_file() {
        CacheStatus::NotFound
    } else {
        match read_cache(path) {
            Ok(contents) => CacheStatus::Loaded(contents),
            Err(err) => CacheStatus::Unreadable {
                message: err.to_string(),
            },
        }
    };
    CacheSummary { file, status }
}

/// Reads and decodes a cache file.
pub fn read_cache(path: &Path) -> Result<CacheContents, CacheError> {
    let size = fs::metadata(path)?.len();
    if size > MAX_CACHE_BYTES {
        return Err(CacheError::TooLarge { size });
    }
    let data = fs::read(path)?;
    let payload = npy_object_payload(&data)?;
    let root = parse_pickle(payload)?;
    let dict = find_cache_dict(&root).ok_or(CacheError::NoDict)?;
    Ok(contents_from_dict(dict))
}

/// Returns the pickle stream of a `.npy` object array.
pub fn npy_object_payload(data: &[u8]) -> Result<&[u8], CacheError> {
    if data.len() < 10 || !data.starts_with(NPY_MAGIC) {
        return Err(CacheError::NotNpy("missing magic string".to_string()));
    }
    let major = data[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        2 | 3 => {
            if data.len() < 12 {
                return Err(CacheError::NotNpy("truncated header length".to_string()));
            }
            (
                u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
                12,
            )
        }
        other => return Err(CacheError::NotNpy(format!("unsupported version {other}"))),
    };

    let header_end = header_start + header_len;
    let header = data
        .get(header_start..header_end)
        .ok_or_else(|| CacheError::NotNpy("truncated header".to_string()))?;
    let header = String::from_utf8_lossy(header);

    let descr = header
        .split("'descr':")
        .nth(1)
        .and_then(|rest| rest.split('\'').nth(1))
        .unwrap_or("")
        .to_string();
    if descr != "|O" {
        return Err(CacheError::NotObjectArray(descr));
    }

    Ok(&data[header_end..])
}

/// A decoded pickle value.
#[derive(Clone, Debug, PartialEq)]
pub enum PickleValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<PickleValue>),
    Tuple(Vec<PickleValue>),
    Set(Vec<PickleValue>),
    Dict(Vec<(PickleValue, PickleValue)>),
    Global {
        module: String,
        name: String,
    },
    /// Result of calling `callable(*args)`, with any state set by BUILD.
    Object {
        callable: Box<PickleValue>,
        args: Box<PickleValue>,
        state: Option<Box<PickleValue>>,
    },
}

impl PickleValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PickleValue::Int(v) => Some(*v),
            PickleValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PickleValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a string key in a dict value.
    pub fn get(&self, key: &str) -> Option<&PickleValue> {
        match self {
            PickleValue::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    fn children(&self) -> Vec<&PickleValue> {
        match self {
            PickleValue::List(items) | PickleValue::Tuple(items) | PickleValue::Set(items) => {
                items.iter().collect()
            }
            PickleValue::Dict(entries) => entries.iter().map(|(_, v)| v).collect(),
            PickleValue::Object { args, state, .. } => {
                let mut out = vec![args.as_ref()];
                if let Some(state) = state {
                    out.push(state.as_ref());
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

/// Depth-first search for the first dict carrying a cache key.
pub fn find_cache_dict(value: &PickleValue) -> Option<&PickleValue> {
    let mut pending = vec![value];
    while let Some(current) = pending.pop() {
        if let PickleValue::Dict(_) = current {
            if CACHE_KEYS.iter().any(|key| current.get(key).is_some()) {
                return Some(current);
            }
        }
        let mut children = current.children();
        children.reverse();
        pending.extend(children);
    }
    None
}

fn contents_from_dict(dict: &PickleValue) -> CacheContents {
    let msgs = match dict.get("msgs") {
        Some(PickleValue::List(items)) | Some(PickleValue::Tuple(items)) => items
            .iter()
            .map(|item| match item {
                PickleValue::Str(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect(),
        _ => Vec::new(),
    };

    let results = match dict.get("results") {
        Some(PickleValue::Tuple(items)) | Some(PickleValue::List(items)) if items.len() >= 5 => {
            let values: Vec<Option<i64>> = items.iter().take(5).map(PickleValue::as_int).collect();
            match values[..] {
                [Some(found), Some(missing), Some(empty), Some(corrupt), Some(total)] => {
                    Some(CacheResults {
                        found,
                        missing,
                        empty,
                        corrupt,
                        total,
                    })
                }
                _ => None,
            }
        }
        _ => None,
    };

    let label_records = match dict.get("labels") {
        Some(PickleValue::List(items)) => Some(items.len()),
        _ => None,
    };

    CacheContents {
        nf: dict.get("nf").and_then(PickleValue::as_int),
        nl: dict.get("nl").and_then(PickleValue::as_int),
        results,
        version: dict.get("version").and_then(|v| v.as_str()).map(str::to_string),
        label_records,
        msgs,
    }
}

mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const DUP: u8 = b'2';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const LONG: u8 = b'L';
    pub const BININT2: u8 = b'M';
    pub const NONE: u8 = b'N';
    pub const REDUCE: u8 = b'R';
    pub const STRING: u8 = b'S';
    pub const BINSTRING: u8 = b'T';
    pub const SHORT_BINSTRING: u8 = b'U';
    pub const UNICODE: u8 = b'V';
    pub const BINUNICODE: u8 = b'X';
    pub const APPEND: u8 = b'a';
    pub const BUILD: u8 = b'b';
    pub const GLOBAL: u8 = b'c';
    pub const DICT: u8 = b'd';
    pub const EMPTY_DICT: u8 = b'}';
    pub const APPENDS: u8 = b'e';
    pub const GET: u8 = b'g';
    pub const BINGET: u8 = b'h';
    pub const LONG_BINGET: u8 = b'j';
    pub const LIST: u8 = b'l';
    pub const EMPTY_LIST: u8 = b']';
    pub const PUT: u8 = b'p';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const SETITEM: u8 = b's';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const SETITEMS: u8 = b'u';
    pub const BINFLOAT: u8 = b'G';
    pub const PROTO: u8 = 0x80;
    pub const NEWOBJ: u8 = 0x81;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const LONG4: u8 = 0x8b;
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const EMPTY_SET: u8 = 0x8f;
    pub const ADDITEMS: u8 = 0x90;
    pub const FROZENSET: u8 = 0x91;
    pub const NEWOBJ_EX: u8 = 0x92;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
    pub const BYTEARRAY8: u8 = 0x96;
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| format!("unexpected end of data reading {n} bytes"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn len_u32(&mut self) -> Result<usize, String> {
        Ok(u32::from_le_bytes(self.array()?) as usize)
    }

    fn len_u64(&mut self) -> Result<usize, String> {
        usize::try_from(u64::from_le_bytes(self.array()?)).map_err(|_| "length overflow".to_string())
    }

    fn line(&mut self) -> Result<&'a str, String> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| "unterminated text line".to_string())?;
        let line = std::str::from_utf8(&rest[..end]).map_err(|_| "non-UTF-8 text line".to_string())?;
        self.pos += end + 1;
        Ok(line)
    }

    fn utf8(&mut self, n: usize) -> Result<String, String> {
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| "invalid UTF-8 string".to_string())
    }
}

#[derive(Default)]
struct Machine {
    stack: Vec<PickleValue>,
    marks: Vec<usize>,
    memo: HashMap<usize, PickleValue>,
}

impl Machine {
    fn pop(&mut self) -> Result<PickleValue, String> {
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn top_mut(&mut self) -> Result<&mut PickleValue, String> {
        self.stack.last_mut().ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_mark(&mut self) -> Result<Vec<PickleValue>, String> {
        let mark = self.marks.pop().ok_or_else(|| "mark not found".to_string())?;
        if mark > self.stack.len() {
            return Err("mark beyond stack".to_string());
        }
        Ok(self.stack.split_off(mark))
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<PickleValue>, String> {
        if self.stack.len() < n {
            return Err("stack underflow".to_string());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn memo_put(&mut self, index: usize) -> Result<(), String> {
        // Snapshots the value; later in-place mutations are not reflected.
        let top = self
            .stack
            .last()
            .cloned()
            .ok_or_else(|| "stack underflow".to_string())?;
        self.memo.insert(index, top);
        Ok(())
    }

    fn memo_get(&mut self, index: usize) -> Result<(), String> {
        let value = self
            .memo
            .get(&index)
            .cloned()
            .ok_or_else(|| format!("memo key {index} not found"))?;
        self.stack.push(value);
        Ok(())
    }
}

fn into_pairs(items: Vec<PickleValue>) -> Result<Vec<(PickleValue, PickleValue)>, String> {
    if items.len() % 2 != 0 {
        return Err("odd number of items for dict".to_string());
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn signed_le(bytes: &[u8]) -> PickleValue {
    if bytes.is_empty() {
        return PickleValue::Int(0);
    }
    if bytes.len() > 8 {
        return PickleValue::None;
    }
    let negative = bytes[bytes.len() - 1] & 0x80 != 0;
    let mut buf = if negative { [0xffu8; 8] } else { [0u8; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    PickleValue::Int(i64::from_le_bytes(buf))
}

fn parse_text_int(line: &str) -> Result<PickleValue, String> {
    match line {
        "00" => Ok(PickleValue::Bool(false)),
        "01" => Ok(PickleValue::Bool(true)),
        _ => line
            .trim_end_matches('L')
            .parse::<i64>()
            .map(PickleValue::Int)
            .map_err(|_| format!("invalid integer literal '{line}'")),
    }
}

/// Runs a pickle stream and returns the value left by STOP.
pub fn parse_pickle(data: &[u8]) -> Result<PickleValue, CacheError> {
    let mut reader = Reader { data, pos: 0 };
    let mut machine = Machine::default();

    loop {
        let offset = reader.pos;
        match step(&mut reader, &mut machine) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(message) => return Err(CacheError::Pickle { offset, message }),
        }
    }
}

fn step(r: &mut Reader<'_>, m: &mut Machine) -> Result<Option<PickleValue>, String> {
    let code = r.byte()?;
    match code {
        op::PROTO => {
            r.byte()?;
        }
        op::FRAME => {
            r.take(8)?;
        }
        op::STOP => return m.pop().map(Some),
        op::MARK => m.marks.push(m.stack.len()),
        op::POP => {
            if m.marks.last() == Some(&m.stack.len()) {
                m.marks.pop();
            } else {
                m.pop()?;
            }
        }
        op::POP_MARK => {
            m.pop_mark()?;
        }
        op::DUP => {
            let top = m.stack.last().cloned().ok_or_else(|| "stack underflow".to_string())?;
            m.stack.push(top);
        }

        op::NONE => m.stack.push(PickleValue::None),
        op::NEWTRUE => m.stack.push(PickleValue::Bool(true)),
        op::NEWFALSE => m.stack.push(PickleValue::Bool(false)),
        op::INT | op::LONG => {
            let value = parse_text_int(r.line()?)?;
            m.stack.push(value);
        }
        op::BININT => m.stack.push(PickleValue::Int(i32::from_le_bytes(r.array()?) as i64)),
        op::BININT1 => m.stack.push(PickleValue::Int(r.byte()? as i64)),
        op::BININT2 => m.stack.push(PickleValue::Int(u16::from_le_bytes(r.array()?) as i64)),
        op::LONG1 => {
            let n = r.byte()? as usize;
            m.stack.push(signed_le(r.take(n)?));
        }
        op::LONG4 => {
            let n = r.len_u32()?;
            m.stack.push(signed_le(r.take(n)?));
        }
        op::FLOAT => {
            let line = r.line()?;
            let value = line
                .parse::<f64>()
                .map_err(|_| format!("invalid float literal '{line}'"))?;
            m.stack.push(PickleValue::Float(value));
        }
        op::BINFLOAT => m.stack.push(PickleValue::Float(f64::from_be_bytes(r.array()?))),

        op::SHORT_BINUNICODE => {
            let n = r.byte()? as usize;
            m.stack.push(PickleValue::Str(r.utf8(n)?));
        }
        op::BINUNICODE => {
            let n = r.len_u32()?;
            m.stack.push(PickleValue::Str(r.utf8(n)?));
        }
        op::BINUNICODE8 => {
            let n = r.len_u64()?;
            m.stack.push(PickleValue::Str(r.utf8(n)?));
        }
        op::UNICODE | op::STRING => {
            let line = r.line()?;
            m.stack.push(PickleValue::Str(line.trim_matches(|c| c == '\'' || c == '"').to_string()));
        }
        op::SHORT_BINSTRING => {
            let n = r.byte()? as usize;
            m.stack.push(PickleValue::Str(String::from_utf8_lossy(r.take(n)?).into_owned()));
        }
        op::BINSTRING => {
            let n = r.len_u32()?;
            m.stack.push(PickleValue::Str(String::from_utf8_lossy(r.take(n)?).into_owned()));
        }
        op::SHORT_BINBYTES => {
            let n = r.byte()? as usize;
            m.stack.push(PickleValue::Bytes(r.take(n)?.to_vec()));
        }
        op::BINBYTES => {
            let n = r.len_u32()?;
            m.stack.push(PickleValue::Bytes(r.take(n)?.to_vec()));
        }
        op::BINBYTES8 | op::BYTEARRAY8 => {
            let n = r.len_u64()?;
            m.stack.push(PickleValue::Bytes(r.take(n)?.to_vec()));
        }

        op::EMPTY_TUPLE => m.stack.push(PickleValue::Tuple(Vec::new())),
        op::TUPLE => {
            let items = m.pop_mark()?;
            m.stack.push(PickleValue::Tuple(items));
        }
        op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
            let items = m.pop_n((code - op::TUPLE1 + 1) as usize)?;
            m.stack.push(PickleValue::Tuple(items));
        }
        op::EMPTY_LIST => m.stack.push(PickleValue::List(Vec::new())),
        op::LIST => {
            let items = m.pop_mark()?;
            m.stack.push(PickleValue::List(items));
        }
        op::APPEND => {
            let value = m.pop()?;
            if let PickleValue::List(items) = m.top_mut()? {
                items.push(value);
            }
        }
        op::APPENDS => {
            let values = m.pop_mark()?;
            if let PickleValue::List(items) = m.top_mut()? {
                items.extend(values);
            }
        }
        op::EMPTY_DICT => m.stack.push(PickleValue::Dict(Vec::new())),
        op::DICT => {
            let items = m.pop_mark()?;
            m.stack.push(PickleValue::Dict(into_pairs(items)?));
        }
        op::SETITEM => {
            let value = m.pop()?;
            let key = m.pop()?;
            if let PickleValue::Dict(entries) = m.top_mut()? {
                entries.push((key, value));
            }
        }
        op::SETITEMS => {
            let pairs = into_pairs(m.pop_mark()?)?;
            if let PickleValue::Dict(entries) = m.top_mut()? {
                entries.extend(pairs);
            }
        }
        op::EMPTY_SET => m.stack.push(PickleValue::Set(Vec::new())),
        op::ADDITEMS => {
            let values = m.pop_mark()?;
            if let PickleValue::Set(items) = m.top_mut()? {
                items.extend(values);
            }
        }
        op::FROZENSET => {
            let items = m.pop_mark()?;
            m.stack.push(PickleValue::Set(items));
        }

        op::PUT => {
            let index = r
                .line()?
                .parse::<usize>()
                .map_err(|_| "invalid memo key".to_string())?;
            m.memo_put(index)?;
        }
        op::BINPUT => {
            let index = r.byte()? as usize;
            m.memo_put(index)?;
        }
        op::LONG_BINPUT => {
            let index = r.len_u32()?;
            m.memo_put(index)?;
        }
        op::MEMOIZE => {
            let index = m.memo.len();
            m.memo_put(index)?;
        }
        op::GET => {
            let index = r
                .line()?
                .parse::<usize>()
                .map_err(|_| "invalid memo key".to_string())?;
            m.memo_get(index)?;
        }
        op::BINGET => {
            let index = r.byte()? as usize;
            m.memo_get(index)?;
        }
        op::LONG_BINGET => {
            let index = r.len_u32()?;
            m.memo_get(index)?;
        }

        op::GLOBAL => {
            let module = r.line()?.to_string();
            let name = r.line()?.to_string();
            m.stack.push(PickleValue::Global { module, name });
        }
        op::STACK_GLOBAL => {
            let name = m.pop()?;
            let module = m.pop()?;
            match (module, name) {
                (PickleValue::Str(module), PickleValue::Str(name)) => {
                    m.stack.push(PickleValue::Global { module, name });
                }
                _ => return Err("STACK_GLOBAL expects two strings".to_string()),
            }
        }
        op::REDUCE | op::NEWOBJ => {
            let args = m.pop()?;
            let callable = m.pop()?;
            m.stack.push(PickleValue::Object {
                callable: Box::new(callable),
                args: Box::new(args),
                state: None,
            });
        }
        op::NEWOBJ_EX => {
            let _kwargs = m.pop()?;
            let args = m.pop()?;
            let callable = m.pop()?;
            m.stack.push(PickleValue::Object {
                callable: Box::new(callable),
                args: Box::new(args),
                state: None,
            });
        }
        op::BUILD => {
            let new_state = m.pop()?;
            match m.top_mut()? {
                PickleValue::Object { state, .. } => *state = Some(Box::new(new_state)),
                PickleValue::Dict(entries) => {
                    if let PickleValue::Dict(extra) = new_state {
                        entries.extend(extra);
                    }
                }
                _ => {}
            }
        }

        other => return Err(format!("unsupported opcode 0x{other:02x}")),
    }
    Ok(None)
}
