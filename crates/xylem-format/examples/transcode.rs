//! Re-format dialect XML from stdin onto stdout, pretty-printed.

use std::io::{Read, Write};

use xylem_format::{ObjectWriter, PrintOptions, VecOutput};
use xylem_parse::StreamParser;

fn main() {
    let mut source = Vec::new();
    std::io::stdin().read_to_end(&mut source).unwrap();

    let mut out = VecOutput::new();
    let mut writer = ObjectWriter::with_options(&mut out, PrintOptions::new().add_whitespace());
    let mut parser = StreamParser::new();
    let result = parser
        .parse(&source, &mut writer)
        .and_then(|_| parser.finish_parse(&mut writer));
    drop(writer);

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
    std::io::stdout().write_all(out.as_bytes()).unwrap();
}
