use std::io::Write as _;
use std::marker::PhantomData;
use std::path::PathBuf;

use csv_core::WriteResult;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write the results to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not create the output file at {1:?}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("could not write results to {}", .1.as_deref().map_or("the terminal".into(), |p| format!("{p:?}")))]
    Write(#[source] std::io::Error, Option<PathBuf>),
    #[error("could not serialize a result to JSON")]
    Json(#[source] serde_json::Error),
}

/// One line of command output.
///
/// Tables and CSV show [`Record::cells`] under [`Record::HEADERS`], JSON lines carry the
/// serialized record.
pub trait Record: serde::Serialize {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

impl Args {
    /// Opens the destination and writes whatever has to precede the records of type `R`.
    pub fn open<R: Record>(self) -> Result<Output<R>, Error> {
        let sink: Box<dyn std::io::Write> = match &self.output {
            None => Box::new(std::io::stdout().lock()),
            Some(path) => Box::new(
                std::fs::File::create(path).map_err(|e| Error::Create(e, path.clone()))?,
            ),
        };
        Output::start(self, sink)
    }
}

/// Results of a command, rendered in the requested [`Format`].
pub struct Output<R> {
    path: Option<PathBuf>,
    sink: Box<dyn std::io::Write>,
    /// Only used for [`Format::Table`], which is printed as a whole at the end.
    table: Option<comfy_table::Table>,
    format: Format,
    _record: PhantomData<fn(&R)>,
}

impl<R: Record> Output<R> {
    fn start(args: Args, sink: Box<dyn std::io::Write>) -> Result<Self, Error> {
        let mut output = Output {
            path: args.output,
            sink,
            table: None,
            format: args.format,
            _record: PhantomData,
        };
        match output.format {
            Format::Table => {
                let mut table = comfy_table::Table::new();
                table.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                table.set_header(R::HEADERS.to_vec());
                output.table = Some(table);
            }
            Format::Csv => output.write_all(&csv_line(R::HEADERS))?,
            Format::Jsonl => {}
        }
        Ok(output)
    }

    pub fn write(&mut self, record: &R) -> Result<(), Error> {
        match self.format {
            Format::Table => {
                if let Some(table) = &mut self.table {
                    table.add_row(record.cells());
                }
            }
            Format::Csv => self.write_all(&csv_line(&record.cells()))?,
            Format::Jsonl => {
                let mut line = serde_json::to_vec(record).map_err(Error::Json)?;
                line.push(b'\n');
                self.write_all(&line)?;
            }
        }
        Ok(())
    }

    /// Prints the table, if any, and flushes the destination.
    pub fn finish(mut self) -> Result<(), Error> {
        if let Some(table) = self.table.take() {
            self.write_all(format!("{table}\n").as_bytes())?;
        }
        self.sink.flush().map_err(|e| Error::Write(e, self.path.clone()))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.sink.write_all(bytes).map_err(|e| Error::Write(e, self.path.clone()))
    }
}

/// Encodes one CSV line, quoting fields where necessary.
fn csv_line<V: AsRef<str>>(fields: &[V]) -> Vec<u8> {
    let mut writer = csv_core::Writer::new();
    let mut line = Vec::new();
    // Enough for any field quoted in full, its closing quote and a delimiter.
    let longest = fields.iter().map(|f| f.as_ref().len()).max().unwrap_or(0);
    let mut buffer = vec![0; 2 * longest + 3];
    for (index, field) in fields.iter().enumerate() {
        if index != 0 {
            let (result, written) = writer.delimiter(&mut buffer);
            debug_assert_eq!(result, WriteResult::InputEmpty);
            line.extend_from_slice(&buffer[..written]);
        }
        let (result, _, written) = writer.field(field.as_ref().as_bytes(), &mut buffer);
        debug_assert_eq!(result, WriteResult::InputEmpty);
        line.extend_from_slice(&buffer[..written]);
    }
    let (result, written) = writer.terminator(&mut buffer);
    debug_assert_eq!(result, WriteResult::InputEmpty);
    line.extend_from_slice(&buffer[..written]);
    line
}
