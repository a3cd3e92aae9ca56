use anyhow::{anyhow, bail, Result};
use encoding_rs::{Encoding as RsEncoding, GBK, SHIFT_JIS, UTF_8};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

pub trait TextCodec {
    fn encoding(&self) -> Encoding;

    /// Decode bytes strictly. Malformed sequences are an error, never replaced.
    fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>>;

    /// Encode text strictly. Characters the encoding cannot represent are an error.
    fn encode<'a>(&self, s: &'a str) -> Result<Cow<'a, [u8]>>;

    /// Decode C-style string: stop at the first NUL (0x00).
    fn decode_cstr<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }

    /// Encode `s` followed by a NUL terminator.
    fn encode_cstr(&self, s: &str) -> Result<Vec<u8>> {
        let mut out = self.encode(s)?.into_owned();
        out.push(0);
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    /// Windows code page 932. encoding_rs' Shift_JIS carries the CP932 extensions.
    #[default]
    ShiftJis,
    Gbk,
}

impl Encoding {
    #[inline]
    pub fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Encoding::Utf8 => UTF_8,
            Encoding::ShiftJis => SHIFT_JIS,
            Encoding::Gbk => GBK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::ShiftJis => "sjis",
            Encoding::Gbk => "gbk",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "sjis" | "shiftjis" | "shift_jis" | "shift-jis" | "cp932" => Ok(Encoding::ShiftJis),
            "gbk" | "cp936" => Ok(Encoding::Gbk),
            other => bail!("unsupported encoding: {other}"),
        }
    }
}

/// A codec bound to one encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    enc: Encoding,
}

impl Codec {
    #[inline]
    pub fn new(enc: Encoding) -> Self {
        Self { enc }
    }

    /// Lossy variant for diagnostics only.
    pub fn decode_lossy<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (cow, _had_errors) = self
            .enc
            .as_encoding_rs()
            .decode_without_bom_handling(bytes);
        cow
    }
}

impl TextCodec for Codec {
    #[inline]
    fn encoding(&self) -> Encoding {
        self.enc
    }

    fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        self.enc
            .as_encoding_rs()
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(|| anyhow!("malformed {} byte sequence", self.enc))
    }

    fn encode<'a>(&self, s: &'a str) -> Result<Cow<'a, [u8]>> {
        let (cow, _, had_errors) = self.enc.as_encoding_rs().encode(s);
        if had_errors {
            bail!("text not representable in {}: {s:?}", self.enc);
        }
        Ok(cow)
    }
}
