use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecParseError {
    #[error("unterminated quote in Exec value '{0}'")]
    UnterminatedQuote(String),
    #[error("empty Exec value")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Code(char),
}

/// The `Exec=` value of a desktop entry, tokenized with the desktop-entry
/// quoting rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecValue {
    raw: String,
    args: Vec<Vec<Piece>>,
}

/// Values substituted for field codes. Building this record up front keeps
/// expansion a pure function of the exec value.
#[derive(Debug, Clone, Default)]
pub struct FieldValues {
    pub files: Vec<String>,
    pub urls: Vec<String>,
    pub name: String,
    pub icon: Option<String>,
    pub location: String,
}

impl ExecValue {
    pub fn parse(raw: &str) -> Result<Self, ExecParseError> {
        let mut args = Vec::new();
        let mut current: Vec<Piece> = Vec::new();
        let mut text = String::new();
        let mut in_token = false;
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                ' ' | '\t' | '\n' => {
                    if in_token {
                        flush_text(&mut text, &mut current);
                        args.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                '"' => {
                    in_token = true;
                    let mut closed = false;
                    while let Some(q) = chars.next() {
                        match q {
                            '"' => {
                                closed = true;
                                break;
                            }
                            '\\' => match chars.next() {
                                Some(e @ ('"' | '`' | '$' | '\\')) => text.push(e),
                                Some(other) => {
                                    text.push('\\');
                                    text.push(other);
                                }
                                None => text.push('\\'),
                            },
                            other => text.push(other),
                        }
                    }
                    if !closed {
                        return Err(ExecParseError::UnterminatedQuote(raw.to_string()));
                    }
                }
                '%' => {
                    in_token = true;
                    match chars.next() {
                        Some('%') | None => text.push('%'),
                        Some(code) => {
                            flush_text(&mut text, &mut current);
                            current.push(Piece::Code(code));
                        }
                    }
                }
                other => {
                    in_token = true;
                    text.push(other);
                }
            }
        }

        if in_token {
            flush_text(&mut text, &mut current);
            args.push(current);
        }

        if args.is_empty() {
            return Err(ExecParseError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            args,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn has_code(&self, codes: &[char]) -> bool {
        self.args
            .iter()
            .flatten()
            .any(|p| matches!(p, Piece::Code(c) if codes.contains(c)))
    }

    /// Whether a local path may be passed, either as `%f`/`%F` or through
    /// the URL codes which accept plain paths as well.
    pub fn can_open_files(&self) -> bool {
        self.has_code(&['f', 'F', 'u', 'U'])
    }

    pub fn can_open_urls(&self) -> bool {
        self.has_code(&['u', 'U'])
    }

    /// True when the program insists on a local path.
    pub fn uses_file_codes(&self) -> bool {
        self.has_code(&['f', 'F'])
    }

    pub fn to_arguments(&self, values: &FieldValues) -> Vec<String> {
        let mut out = Vec::new();

        for arg in &self.args {
            if let [Piece::Code(code)] = arg.as_slice() {
                match code {
                    'f' => out.extend(values.files.first().cloned()),
                    'F' => out.extend(values.files.iter().cloned()),
                    'u' => out.extend(values.urls.first().cloned()),
                    'U' => out.extend(values.urls.iter().cloned()),
                    'i' => {
                        if let Some(icon) = &values.icon {
                            out.push("--icon".to_string());
                            out.push(icon.clone());
                        }
                    }
                    'c' => out.push(values.name.clone()),
                    'k' => out.push(values.location.clone()),
                    // %d %D %n %N %v %m are deprecated, unknown codes are dropped
                    _ => {}
                }
                continue;
            }

            let mut expanded = String::new();
            for piece in arg {
                match piece {
                    Piece::Text(text) => expanded.push_str(text),
                    Piece::Code('f' | 'F') => {
                        expanded.push_str(values.files.first().map(String::as_str).unwrap_or(""))
                    }
                    Piece::Code('u' | 'U') => {
                        expanded.push_str(values.urls.first().map(String::as_str).unwrap_or(""))
                    }
                    Piece::Code('c') => expanded.push_str(&values.name),
                    Piece::Code('k') => expanded.push_str(&values.location),
                    Piece::Code('i') => {
                        expanded.push_str(values.icon.as_deref().unwrap_or(""))
                    }
                    Piece::Code(_) => {}
                }
            }
            out.push(expanded);
        }

        out
    }
}

fn flush_text(text: &mut String, current: &mut Vec<Piece>) {
    if !text.is_empty() {
        current.push(Piece::Text(std::mem::take(text)));
    }
}
