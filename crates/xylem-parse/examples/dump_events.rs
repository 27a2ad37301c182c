use std::io::Read;
use xylem_parse::{Event, StreamParser};

fn main() {
    let mut source = Vec::new();
    std::io::stdin().read_to_end(&mut source).unwrap();

    let mut events: Vec<Event> = Vec::new();
    let mut parser = StreamParser::new();
    let result = parser
        .parse(&source, &mut events)
        .and_then(|_| parser.finish_parse(&mut events));

    for event in &events {
        println!("{:?}", event);
    }
    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
