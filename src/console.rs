use std::io::{self, BufRead, Write};

/// How a single prompt behaves.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions<'a> {
    pub prompt: &'a str,
    /// Returned on empty input and shown next to the prompt.
    pub default_value: &'a str,
    /// Ask again while the answer is empty and there is no default.
    pub required: bool,
}

/// Line-oriented prompt reader, usually over `/dev/tty` with prompts on stderr.
pub struct PromptReader<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> PromptReader<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn read_with_options(&mut self, opts: &ReadOptions<'_>) -> io::Result<String> {
        loop {
            if opts.default_value.is_empty() {
                write!(self.writer, "{}: ", opts.prompt)?;
            } else {
                write!(self.writer, "{} ({}): ", opts.prompt, opts.default_value)?;
            }
            self.writer.flush()?;

            let value = self.read_line()?;
            if !value.is_empty() {
                return Ok(value);
            }
            if !opts.default_value.is_empty() || !opts.required {
                return Ok(opts.default_value.to_string());
            }
        }
    }

    /// Reads one line with surrounding whitespace trimmed.
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a value was entered",
            ));
        }
        Ok(line.trim().to_string())
    }
}
