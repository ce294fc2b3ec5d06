/// Text encoding of `.dbf` character fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8.
    Utf8,
    /// ISO-8859-1. Every byte maps to the code point with the same value.
    Latin1,
    /// No code page given: UTF-8 if the value is valid UTF-8, Latin-1 otherwise.
    #[default]
    Auto,
}

impl Encoding {
    /// Parses the content of a `.cpg` sidecar file.
    pub fn from_cpg(content: &[u8]) -> Self {
        let name = String::from_utf8_lossy(content).trim().to_ascii_uppercase();
        match name.as_str() {
            "UTF-8" | "UTF8" | "65001" => Encoding::Utf8,
            "ISO-8859-1" | "ISO8859-1" | "ISO88591" | "8859_1" | "LATIN1" | "1252" | "CP1252"
            | "WINDOWS-1252" | "ANSI 1252" => Encoding::Latin1,
            _ => {
                log::debug!("Unknown code page '{name}', detecting text encoding per value");
                Encoding::Auto
            }
        }
    }

    /// Decodes a text value.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Auto => match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => Encoding::Latin1.decode(bytes),
            },
        }
    }
}
