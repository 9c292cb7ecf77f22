use crate::error::PanelError;

/// Tokens produced by the Gerber lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum GerberToken {
    /// One `%...%` block, split into its `*`-terminated statements.
    /// Example: `["FSLAX24Y24", "MOMM"]`, `["AMTHERMAL", "7,0,0,$1,$2,$3,45"]`
    Extended(Vec<String>),
    /// A G-code word without its terminator. Example: `"G01"`, `"G04 comment"`
    GCode(String),
    /// A D-code word. `coords` holds whatever X/Y/I/J text preceded the `D`; it is empty
    /// for an aperture select.
    /// Example: `coords: "X100Y200"`, `code: 1`
    DCode { coords: String, code: u32 },
    /// Coordinates with no D-code; the previous operation code applies.
    Coordinates(String),
    /// An M-code word. Example: `"M02"`
    MCode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    Command,
    GCode,
    DCode,
}

/// Tokenize a Gerber file.
///
/// Walks the input one character at a time. Outside of any command, coordinate
/// characters accumulate into a buffer; a `D` then decides whether the word is an
/// operation (buffer filled) or an aperture select (buffer empty).
pub fn tokenize(input: &str) -> Result<Vec<GerberToken>, PanelError> {
    let mut tokens = Vec::new();
    let mut state = State::None;
    let mut buffer = String::new();
    let mut coords = String::new();
    let mut blocks: Vec<String> = Vec::new();

    for ch in input.chars() {
        if ch == '\n' || ch == '\r' {
            continue;
        }
        match state {
            State::None => match ch {
                '%' => {
                    if !coords.is_empty() {
                        return Err(PanelError::Format(format!(
                            "unterminated coordinates before extended command: {coords}"
                        )));
                    }
                    state = State::Command;
                    buffer.clear();
                    blocks.clear();
                }
                'G' | 'g' if coords.is_empty() => {
                    state = State::GCode;
                    buffer.clear();
                    buffer.push('G');
                }
                'D' | 'd' => {
                    state = State::DCode;
                    buffer.clear();
                }
                'M' | 'm' if coords.is_empty() => {
                    // M-codes share the G-code word shape.
                    state = State::GCode;
                    buffer.clear();
                    buffer.push('M');
                }
                'X' | 'Y' | 'I' | 'J' | 'x' | 'y' | 'i' | 'j' => coords.push(ch.to_ascii_uppercase()),
                '0'..='9' | '-' | '+' if !coords.is_empty() => coords.push(ch),
                '*' => {
                    if !coords.is_empty() {
                        tokens.push(GerberToken::Coordinates(std::mem::take(&mut coords)));
                    }
                }
                ' ' | '\t' => {}
                other => {
                    return Err(PanelError::Format(format!(
                        "unexpected character '{other}'"
                    )))
                }
            },
            State::Command => match ch {
                '*' => {
                    let statement = buffer.trim().to_string();
                    if !statement.is_empty() {
                        blocks.push(statement);
                    }
                    buffer.clear();
                }
                '%' => {
                    let statement = buffer.trim().to_string();
                    if !statement.is_empty() {
                        blocks.push(statement);
                    }
                    buffer.clear();
                    if !blocks.is_empty() {
                        tokens.push(GerberToken::Extended(std::mem::take(&mut blocks)));
                    }
                    state = State::None;
                }
                c => buffer.push(c),
            },
            State::GCode => {
                let is_comment =
                    buffer.starts_with("G04") || buffer.starts_with("G4 ") || buffer == "G4";
                match ch {
                    '*' => {
                        push_code_word(&mut tokens, &buffer);
                        buffer.clear();
                        state = State::None;
                    }
                    // A G-code may prefix an operation: `G01X100Y200D01*`, `G54D10*`.
                    'X' | 'Y' | 'I' | 'J' | 'D' if !is_comment && buffer.starts_with('G') => {
                        push_code_word(&mut tokens, &buffer);
                        buffer.clear();
                        if ch == 'D' {
                            state = State::DCode;
                        } else {
                            coords.push(ch);
                            state = State::None;
                        }
                    }
                    c => buffer.push(c),
                }
            }
            State::DCode => match ch {
                '*' => {
                    let code: u32 = buffer.trim().parse().map_err(|_| {
                        PanelError::Format(format!("bad D-code: D{buffer}"))
                    })?;
                    tokens.push(GerberToken::DCode {
                        coords: std::mem::take(&mut coords),
                        code,
                    });
                    buffer.clear();
                    state = State::None;
                }
                c => buffer.push(c),
            },
        }
    }

    match state {
        State::None if coords.is_empty() => Ok(tokens),
        State::None => Err(PanelError::Format(format!(
            "unterminated coordinates at end of file: {coords}"
        ))),
        State::Command => Err(PanelError::Format(
            "unterminated extended command at end of file".into(),
        )),
        State::GCode | State::DCode => Err(PanelError::Format(format!(
            "unterminated word at end of file: {buffer}"
        ))),
    }
}

fn push_code_word(tokens: &mut Vec<GerberToken>, word: &str) {
    let word = word.trim().to_string();
    if word.starts_with('M') {
        tokens.push(GerberToken::MCode(word));
    } else {
        tokens.push(GerberToken::GCode(word));
    }
}
