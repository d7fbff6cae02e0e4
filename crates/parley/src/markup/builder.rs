//! Builds a [`GenericValue`] from the YAML event stream.
//!
//! Working on events rather than a loaded document keeps the scalar style
//! available (only plain scalars are resolved to non-string types) and lets
//! nesting depth and alias expansion be bounded while the tree is built.

use std::collections::{BTreeMap, HashMap};

use yaml_rust2::parser::{Event, MarkedEventReceiver};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

use super::scalar::resolve_plain_scalar;
use super::{MAX_ALIAS_NODES, MAX_NESTING_DEPTH, ParseError, Position};
use crate::models::GenericValue;

const ROOT_PATH: &str = "$";
const MERGE_KEY: &str = "<<";

enum PendingKey {
    Entry(String),
    Merge,
}

enum FrameKind {
    Sequence(Vec<GenericValue>),
    Mapping {
        entries: BTreeMap<String, GenericValue>,
        merges: Vec<GenericValue>,
        pending: Option<PendingKey>,
    },
}

struct Frame {
    kind: FrameKind,
    anchor: usize,
    path: String,
}

struct Anchored {
    value: GenericValue,
    nodes: usize,
    depth: usize,
}

pub(super) struct TreeBuilder<'o> {
    origin: &'o str,
    stack: Vec<Frame>,
    anchors: HashMap<usize, Anchored>,
    root: Option<GenericValue>,
    documents: usize,
    alias_nodes: usize,
    error: Option<ParseError>,
}

impl<'o> TreeBuilder<'o> {
    pub(super) fn new(origin: &'o str) -> Self {
        Self {
            origin,
            stack: Vec::new(),
            anchors: HashMap::new(),
            root: None,
            documents: 0,
            alias_nodes: 0,
            error: None,
        }
    }

    /// The first error seen while building wins over a later scanner error.
    pub(super) fn finish(self, loaded: Result<(), ScanError>) -> Result<GenericValue, ParseError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        loaded.map_err(|error| {
            ParseError::syntax(self.origin, Some(position(*error.marker())), error.to_string())
        })?;
        Ok(self.root.unwrap_or(GenericValue::Null))
    }

    fn handle(&mut self, event: Event, mark: Marker) -> Result<(), ParseError> {
        match event {
            Event::DocumentStart { .. } => {
                self.documents += 1;
                if self.documents > 1 {
                    return Err(self.error_at(
                        mark,
                        "multiple documents in one file are not supported",
                    ));
                }
                Ok(())
            }
            Event::Scalar(text, style, anchor, tag) => {
                if let Some(tag) = tag {
                    return Err(self.tag_error(mark, &tag.handle, &tag.suffix));
                }
                let plain = style == TScalarStyle::Plain;
                let merge = plain && text == MERGE_KEY;
                let value = if plain {
                    resolve_plain_scalar(&text)
                } else {
                    GenericValue::String(text)
                };
                self.complete(value, anchor, merge, mark)
            }
            Event::SequenceStart(anchor, tag) => {
                if let Some(tag) = tag {
                    return Err(self.tag_error(mark, &tag.handle, &tag.suffix));
                }
                self.open(FrameKind::Sequence(Vec::new()), anchor, "sequence", mark)
            }
            Event::MappingStart(anchor, tag) => {
                if let Some(tag) = tag {
                    return Err(self.tag_error(mark, &tag.handle, &tag.suffix));
                }
                let kind = FrameKind::Mapping {
                    entries: BTreeMap::new(),
                    merges: Vec::new(),
                    pending: None,
                };
                self.open(kind, anchor, "mapping", mark)
            }
            Event::SequenceEnd | Event::MappingEnd => self.close(mark),
            Event::Alias(id) => self.alias(id, mark),
            _ => Ok(()),
        }
    }

    fn open(
        &mut self,
        kind: FrameKind,
        anchor: usize,
        kind_name: &str,
        mark: Marker,
    ) -> Result<(), ParseError> {
        let path = self.child_path();
        if self.in_key_position() {
            return Err(self.error_at(
                mark,
                format!("mapping key at `{path}` must be a scalar, found {kind_name}"),
            ));
        }
        if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(self.error_at(
                mark,
                format!("nesting deeper than {MAX_NESTING_DEPTH} levels at `{path}`"),
            ));
        }
        self.stack.push(Frame { kind, anchor, path });
        Ok(())
    }

    fn close(&mut self, mark: Marker) -> Result<(), ParseError> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        let value = match frame.kind {
            FrameKind::Sequence(items) => GenericValue::Sequence(items),
            FrameKind::Mapping {
                mut entries,
                merges,
                ..
            } => {
                for source in merges {
                    merge_into(&mut entries, source, &frame.path)
                        .map_err(|message| self.error_at(mark, message))?;
                }
                GenericValue::Mapping(entries)
            }
        };
        self.complete(value, frame.anchor, false, mark)
    }

    fn alias(&mut self, id: usize, mark: Marker) -> Result<(), ParseError> {
        let path = self.child_path();
        let Some(anchored) = self.anchors.get(&id) else {
            return Err(self.error_at(mark, format!("unknown alias at `{path}`")));
        };
        if self.stack.len() + anchored.depth > MAX_NESTING_DEPTH {
            return Err(self.error_at(
                mark,
                format!("alias at `{path}` nests deeper than {MAX_NESTING_DEPTH} levels"),
            ));
        }
        self.alias_nodes += anchored.nodes;
        if self.alias_nodes > MAX_ALIAS_NODES {
            return Err(self.error_at(
                mark,
                format!("aliases expand to more than {MAX_ALIAS_NODES} nodes at `{path}`"),
            ));
        }
        let value = anchored.value.clone();
        self.complete(value, 0, false, mark)
    }

    /// Attaches a finished node to its parent, or makes it the root.
    fn complete(
        &mut self,
        value: GenericValue,
        anchor: usize,
        merge: bool,
        mark: Marker,
    ) -> Result<(), ParseError> {
        if anchor != 0 {
            let (nodes, depth) = measure(&value);
            self.anchors.insert(
                anchor,
                Anchored {
                    value: value.clone(),
                    nodes,
                    depth,
                },
            );
        }

        let origin = self.origin;
        let Some(frame) = self.stack.last_mut() else {
            self.root = Some(value);
            return Ok(());
        };
        match &mut frame.kind {
            FrameKind::Sequence(items) => items.push(value),
            FrameKind::Mapping {
                entries,
                merges,
                pending,
            } => match pending.take() {
                None if merge => *pending = Some(PendingKey::Merge),
                None => {
                    let key = mapping_key(value, &frame.path).map_err(|message| {
                        ParseError::syntax(origin, Some(position(mark)), message)
                    })?;
                    if entries.contains_key(&key) {
                        return Err(ParseError::syntax(
                            origin,
                            Some(position(mark)),
                            format!("duplicate mapping key `{key}` at `{}`", frame.path),
                        ));
                    }
                    *pending = Some(PendingKey::Entry(key));
                }
                Some(PendingKey::Merge) => merges.push(value),
                Some(PendingKey::Entry(key)) => {
                    entries.insert(key, value);
                }
            },
        }
        Ok(())
    }

    fn in_key_position(&self) -> bool {
        matches!(
            self.stack.last(),
            Some(Frame {
                kind: FrameKind::Mapping { pending: None, .. },
                ..
            })
        )
    }

    /// Path of the node about to be attached to the innermost open collection.
    fn child_path(&self) -> String {
        let Some(frame) = self.stack.last() else {
            return ROOT_PATH.to_string();
        };
        match &frame.kind {
            FrameKind::Sequence(items) => format!("{}[{}]", frame.path, items.len()),
            FrameKind::Mapping { pending, .. } => match pending {
                Some(PendingKey::Entry(key)) => format!("{}.{key}", frame.path),
                Some(PendingKey::Merge) => format!("{}.{MERGE_KEY}", frame.path),
                None => frame.path.clone(),
            },
        }
    }

    fn tag_error(&self, mark: Marker, handle: &str, suffix: &str) -> ParseError {
        self.error_at(
            mark,
            format!(
                "explicit tag `{handle}{suffix}` at `{}` is not allowed; only plain scalars, sequences and mappings are accepted",
                self.child_path()
            ),
        )
    }

    fn error_at(&self, mark: Marker, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.origin, Some(position(mark)), message)
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.handle(event, mark) {
            self.error = Some(error);
        }
    }
}

/// Explicit keys win over merged ones, and earlier merge sources win over
/// later ones.
fn merge_into(
    entries: &mut BTreeMap<String, GenericValue>,
    source: GenericValue,
    path: &str,
) -> Result<(), String> {
    let sources = match source {
        GenericValue::Mapping(map) => vec![map],
        GenericValue::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                GenericValue::Mapping(map) => Ok(map),
                _ => Err(format!(
                    "merge sequence at `{path}` may only contain mappings"
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(format!(
                "merge value at `{path}` must be a mapping or a sequence of mappings"
            ));
        }
    };
    for map in sources {
        for (key, value) in map {
            entries.entry(key).or_insert(value);
        }
    }
    Ok(())
}

fn mapping_key(key: GenericValue, path: &str) -> Result<String, String> {
    match key {
        GenericValue::String(text) => Ok(text),
        GenericValue::Null => Ok("null".to_string()),
        GenericValue::Bool(value) => Ok(value.to_string()),
        GenericValue::Number(number) => Ok(number.to_string()),
        GenericValue::Timestamp(timestamp) => Ok(timestamp.to_string()),
        other => Err(format!(
            "mapping key at `{path}` must be a scalar, found {}",
            other.kind_name()
        )),
    }
}

/// Node count and nesting depth of `value`; scalars have depth zero.
fn measure(value: &GenericValue) -> (usize, usize) {
    let children: Box<dyn Iterator<Item = &GenericValue>> = match value {
        GenericValue::Sequence(items) => Box::new(items.iter()),
        GenericValue::Mapping(map) => Box::new(map.values()),
        _ => return (1, 0),
    };
    let (nodes, depth) = children
        .map(measure)
        .fold((1, 0), |(nodes, depth), (child_nodes, child_depth)| {
            (nodes + child_nodes, depth.max(child_depth))
        });
    (nodes, depth + 1)
}

fn position(mark: Marker) -> Position {
    Position {
        line: mark.line().max(1),
        column: mark.col() + 1,
    }
}
