//! The structured-event seam between the parser and its consumers.

/// Receiver for the structured events produced by the parser.
///
/// The writer side of the transcoder (`xylem-format`) implements this same
/// interface, so a parser can drive a writer directly and vice versa.
///
/// Naming conventions on the seam:
/// - `start_object("")` means an anonymous object; the consumer decides what
///   name it materializes under (the writer substitutes `root` at the top
///   level and the enclosing list's element name inside a list).
/// - `start_list` is always called with a non-empty name.
/// - `render_scalar("", value)` is a text node; a non-empty name is an
///   attribute.
pub trait EventSink {
    /// An object opened. Empty `name` means anonymous.
    fn start_object(&mut self, name: &str);
    /// The most recently opened object closed.
    fn end_object(&mut self);
    /// A repeated field opened.
    fn start_list(&mut self, name: &str);
    /// The most recently opened list closed.
    fn end_list(&mut self);
    /// A scalar value. Empty `name` means a text node, otherwise an
    /// attribute on the enclosing element.
    fn render_scalar(&mut self, name: &str, value: &str);
}

/// An owned event, for sinks that buffer instead of acting immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start of an object; empty name means anonymous.
    StartObject(String),
    /// End of the innermost object.
    EndObject,
    /// Start of a repeated field.
    StartList(String),
    /// End of the innermost list.
    EndList,
    /// A scalar; empty name means a text node.
    Scalar {
        /// Attribute key, or empty for a text node.
        name: String,
        /// The raw scalar value after escape processing.
        value: String,
    },
}

impl Event {
    /// Convenience constructor for scalar events.
    pub fn scalar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Event::Scalar {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Collecting sink, mostly useful in tests and tree builders.
impl EventSink for Vec<Event> {
    fn start_object(&mut self, name: &str) {
        self.push(Event::StartObject(name.to_string()));
    }

    fn end_object(&mut self) {
        self.push(Event::EndObject);
    }

    fn start_list(&mut self, name: &str) {
        self.push(Event::StartList(name.to_string()));
    }

    fn end_list(&mut self) {
        self.push(Event::EndList);
    }

    fn render_scalar(&mut self, name: &str, value: &str) {
        self.push(Event::scalar(name, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_collects_in_order() {
        let mut events: Vec<Event> = Vec::new();
        events.start_object("");
        events.start_list("test");
        events.render_scalar("", "a");
        events.end_list();
        events.end_object();
        assert_eq!(
            events,
            vec![
                Event::StartObject(String::new()),
                Event::StartList("test".to_string()),
                Event::scalar("", "a"),
                Event::EndList,
                Event::EndObject,
            ]
        );
    }
}
