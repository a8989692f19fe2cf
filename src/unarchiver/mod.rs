/*!
 Contains logic used to reconstruct an object tree from `NSKeyedArchiver` data.

 ## Overview

 `NSKeyedArchiver` flattens an Objective-C or Swift object graph into an
 ordinary property list: every object lands in a single `$objects` table, and
 object fields point back into that table through `CF$UID` references. The
 [`Unarchiver`] walks the table from `$top`, resolves every reference, maps the
 common Foundation container classes onto plain nodes, and hands anything less
 common to the [class-handler registry](registry).

 ## Graph shape

 The output is a tree, not a DAG: two references to the same table entry
 materialize as two equal but independent subtrees, which keeps downstream
 tree-shaped serialization (JSON, YAML, ...) straightforward. Reference cycles
 are broken with a `"$ref<n>"` string sentinel, and pathological dereference
 chains are cut off by a recursion limit rather than looping.
*/

pub mod handlers;
pub mod registry;

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::{
    error::archive::ArchiveError,
    plist::{
        binary::UID_KEY,
        models::{Dictionary, Node},
    },
    util::dates,
};

use registry::ClassHandler;

/// Required value of the `$archiver` envelope field
const ARCHIVER_NAME: &str = "NSKeyedArchiver";
/// Envelope field naming the archiver
const ARCHIVER_KEY: &str = "$archiver";
/// Envelope field carrying the archive version
const VERSION_KEY: &str = "$version";
/// Envelope field holding the flattened object table
const OBJECTS_KEY: &str = "$objects";
/// Envelope field holding the roots of the graph
const TOP_KEY: &str = "$top";
/// Conventional single key of `$top`
const ROOT_KEY: &str = "root";
/// Key carrying class metadata on archived objects
const CLASS_KEY: &str = "$class";
/// Key listing the class hierarchy inside class metadata, most-derived first
const CLASSES_KEY: &str = "$classes";
/// String marking the absent value, conventionally stored at table index 0
const NULL_MARKER: &str = "$null";
/// Maximum number of nested reference hops before resolution is cut off
const MAX_DEPTH: usize = 100;

/// Options controlling how an archive is reconstructed
#[derive(Debug, Clone, Copy)]
pub struct UnarchiveOptions {
    /// Remove the `$class` key from dictionaries whose class metadata was
    /// consumed. When `false`, `$class` is retained as a resolved value.
    pub remove_class_names: bool,
}

impl Default for UnarchiveOptions {
    fn default() -> Self {
        Self {
            remove_class_names: true,
        }
    }
}

/// Reconstruct the object tree of a keyed archive.
///
/// The envelope must be a dictionary carrying `$archiver`, `$version`,
/// `$objects`, and `$top`; anything else fails with
/// [`ArchiveError::InvalidArchive`].
pub fn unarchive(envelope: &Node, options: UnarchiveOptions) -> Result<Node, ArchiveError> {
    Unarchiver::new(envelope, options)?.unarchive()
}

/// Whether a node looks like a keyed-archive envelope.
///
/// Useful for callers that read arbitrary property lists and only unarchive
/// the ones that need it.
pub fn is_keyed_archive(node: &Node) -> bool {
    match node {
        Node::Dictionary(dict) => {
            matches!(dict.get(ARCHIVER_KEY), Some(Node::String(name)) if name == ARCHIVER_NAME)
                && dict.contains_key(VERSION_KEY)
                && dict.contains_key(OBJECTS_KEY)
                && dict.contains_key(TOP_KEY)
        }
        _ => false,
    }
}

/// Contains the state used to resolve one archive.
///
/// An instance owns a copy of the object table and a snapshot of the
/// [class-handler registry](registry) taken at construction, so decoding never
/// touches shared state.
pub struct Unarchiver {
    /// The `$objects` table
    objects: Vec<Node>,
    /// The `$top` roots
    top: Dictionary,
    /// Finished materializations, by table index
    resolved: HashMap<usize, Node>,
    /// Table indices currently being resolved, for cycle detection
    in_flight: HashSet<usize>,
    /// Snapshot of the class-handler registry
    handlers: HashMap<String, ClassHandler>,
    options: UnarchiveOptions,
}

impl Unarchiver {
    /// Validate the envelope and construct an unarchiver for it
    pub fn new(envelope: &Node, options: UnarchiveOptions) -> Result<Self, ArchiveError> {
        let envelope = envelope
            .as_dict()
            .map_err(|_| ArchiveError::InvalidArchive("envelope is not a dictionary".to_string()))?;

        match envelope.get(ARCHIVER_KEY) {
            Some(Node::String(name)) if name == ARCHIVER_NAME => {}
            Some(_) | None => {
                return Err(ArchiveError::InvalidArchive(format!(
                    "{ARCHIVER_KEY} is not the string \"{ARCHIVER_NAME}\""
                )))
            }
        }
        // Only presence matters for the version
        match envelope.get(VERSION_KEY) {
            Some(Node::Number(_)) => {}
            Some(_) | None => {
                return Err(ArchiveError::InvalidArchive(format!(
                    "{VERSION_KEY} is missing or not a number"
                )))
            }
        }
        let objects = match envelope.get(OBJECTS_KEY) {
            Some(Node::Array(objects)) => objects.clone(),
            Some(_) | None => {
                return Err(ArchiveError::InvalidArchive(format!(
                    "{OBJECTS_KEY} is missing or not an array"
                )))
            }
        };
        let top = match envelope.get(TOP_KEY) {
            Some(Node::Dictionary(top)) => top.clone(),
            Some(_) | None => {
                return Err(ArchiveError::InvalidArchive(format!(
                    "{TOP_KEY} is missing or not a dictionary"
                )))
            }
        };

        Ok(Self {
            objects,
            top,
            resolved: HashMap::new(),
            in_flight: HashSet::new(),
            handlers: registry::snapshot(),
            options,
        })
    }

    /// Resolve the archive into a plain node tree.
    ///
    /// A `$top` of exactly `{"root": <ref>}` unwraps to the resolved root;
    /// any other shape keeps `$top`'s keys with each value resolved
    /// independently.
    pub fn unarchive(mut self) -> Result<Node, ArchiveError> {
        if self.top.len() == 1 {
            if let Some(root) = self.top.get(ROOT_KEY) {
                let root = root.clone();
                return self.resolve(&root, 0);
            }
        }

        let top = self.top.clone();
        let mut out = Dictionary::with_capacity(top.len());
        for (key, value) in &top {
            out.insert(key.clone(), self.resolve(value, 0)?);
        }
        Ok(Node::Dictionary(out))
    }

    /// Depth-first resolution of one node
    fn resolve(&mut self, node: &Node, depth: usize) -> Result<Node, ArchiveError> {
        if let Some(index) = uid_index(node) {
            return self.resolve_uid(index, depth + 1);
        }

        match node {
            Node::String(text) if text == NULL_MARKER => Ok(Node::Null),
            Node::Dictionary(dict) => {
                if dict.contains_key(CLASS_KEY) {
                    self.resolve_classed(dict, depth)
                } else {
                    let mut out = Dictionary::with_capacity(dict.len());
                    for (key, value) in dict {
                        out.insert(key.clone(), self.resolve(value, depth)?);
                    }
                    Ok(Node::Dictionary(out))
                }
            }
            Node::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve(item, depth)?);
                }
                Ok(Node::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Materialize the object behind a table reference.
    ///
    /// Finished objects come from the cache; an index already on the stack is
    /// a cycle and yields the `"$ref<n>"` sentinel instead of recursing.
    fn resolve_uid(&mut self, index: usize, depth: usize) -> Result<Node, ArchiveError> {
        if depth > MAX_DEPTH {
            let partial = self.resolved.get(&index).cloned().unwrap_or(Node::Null);
            let mut placeholder = Dictionary::new();
            placeholder.insert(
                "error".to_string(),
                Node::string("Recursion limit exceeded"),
            );
            placeholder.insert("partial".to_string(), partial);
            return Err(ArchiveError::RecursionLimit(
                depth,
                Node::Dictionary(placeholder),
            ));
        }
        if self.in_flight.contains(&index) {
            return Ok(Node::String(format!("$ref{index}")));
        }
        if let Some(done) = self.resolved.get(&index) {
            return Ok(done.clone());
        }

        let target = self.objects.get(index).cloned().ok_or_else(|| {
            ArchiveError::MalformedNode(UID_KEY.to_string(), Node::integer(index as i128))
        })?;

        self.in_flight.insert(index);
        let result = self.resolve(&target, depth);
        self.in_flight.remove(&index);

        let value = result?;
        self.resolved.insert(index, value.clone());
        Ok(value)
    }

    /// Resolve a dictionary that carries class metadata: read the effective
    /// class name, resolve the remaining fields, then dispatch to a built-in
    /// decoder, a registered handler, or the plain-dictionary fallback.
    fn resolve_classed(&mut self, dict: &Dictionary, depth: usize) -> Result<Node, ArchiveError> {
        let class_node = match dict.get(CLASS_KEY) {
            Some(node) => node.clone(),
            None => return Err(ArchiveError::MalformedNode(CLASS_KEY.to_string(), Node::Null)),
        };
        let class_name = self.class_name(&class_node, depth)?;

        let mut fields = Dictionary::with_capacity(dict.len());
        for (key, value) in dict {
            if key == CLASS_KEY && self.options.remove_class_names {
                continue;
            }
            fields.insert(key.clone(), self.resolve(value, depth)?);
        }

        match class_name.as_str() {
            "NSArray" | "NSMutableArray" | "NSSet" | "NSMutableSet" => {
                self.decode_collection(&fields)
            }
            "NSDictionary" | "NSMutableDictionary" => self.decode_dictionary(&fields),
            "NSString" | "NSMutableString" => self.decode_string(&fields),
            "NSDate" => self.decode_date(&fields),
            "NSData" | "NSMutableData" => self.decode_data(&fields),
            name => {
                if let Some(handler) = self.handlers.get(name) {
                    return Ok(handler.as_ref()(&fields));
                }
                Ok(Node::Dictionary(fields))
            }
        }
    }

    /// Follow `$class` to its metadata dictionary and read `$classes[0]`,
    /// the most-derived class name
    fn class_name(&mut self, class_node: &Node, depth: usize) -> Result<String, ArchiveError> {
        if uid_index(class_node).is_none() {
            return Err(ArchiveError::MalformedNode(
                CLASS_KEY.to_string(),
                class_node.clone(),
            ));
        }
        let meta = self.resolve(class_node, depth)?;
        let name = meta
            .as_dict()
            .ok()
            .and_then(|meta| meta.get(CLASSES_KEY))
            .and_then(|classes| classes.as_array().ok())
            .and_then(|classes| classes.first())
            .and_then(|first| first.as_string().ok())
            .map(str::to_string);
        match name {
            Some(name) => Ok(name),
            None => Err(ArchiveError::MalformedNode(CLASSES_KEY.to_string(), meta)),
        }
    }

    /// NSArray, NSSet, and their mutable variants: the elements live in `NS.objects`
    fn decode_collection(&self, fields: &Dictionary) -> Result<Node, ArchiveError> {
        let items = self.expect_field(fields, "NS.objects")?;
        let items = items
            .as_array()
            .map_err(|_| ArchiveError::MalformedNode("NS.objects".to_string(), items.clone()))?;
        Ok(Node::Array(items.to_vec()))
    }

    /// NSDictionary: parallel `NS.keys` and `NS.objects` arrays.
    ///
    /// Non-string keys are skipped rather than rejected; Apple archives
    /// occasionally contain them and the tree model has no place for them.
    fn decode_dictionary(&self, fields: &Dictionary) -> Result<Node, ArchiveError> {
        let keys = self.expect_field(fields, "NS.keys")?;
        let keys = keys
            .as_array()
            .map_err(|_| ArchiveError::MalformedNode("NS.keys".to_string(), keys.clone()))?;
        let values = self.expect_field(fields, "NS.objects")?;
        let values = values
            .as_array()
            .map_err(|_| ArchiveError::MalformedNode("NS.objects".to_string(), values.clone()))?;

        let mut out = Dictionary::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            match key {
                Node::String(key) => {
                    out.insert(key.clone(), value.clone());
                }
                other => warn!("skipping non-string dictionary key: {other:?}"),
            }
        }
        Ok(Node::Dictionary(out))
    }

    /// NSString: the text lives in `NS.string`
    fn decode_string(&self, fields: &Dictionary) -> Result<Node, ArchiveError> {
        let text = self.expect_field(fields, "NS.string")?;
        let text = text
            .as_string()
            .map_err(|_| ArchiveError::MalformedNode("NS.string".to_string(), text.clone()))?;
        Ok(Node::string(text))
    }

    /// NSDate: `NS.time` holds seconds relative to the Apple epoch
    fn decode_date(&self, fields: &Dictionary) -> Result<Node, ArchiveError> {
        let time = self.expect_field(fields, "NS.time")?;
        let seconds = time
            .as_number_f64()
            .map_err(|_| ArchiveError::MalformedNode("NS.time".to_string(), time.clone()))?;
        dates::from_apple_time(seconds)
            .map(Node::Date)
            .ok_or_else(|| ArchiveError::MalformedNode("NS.time".to_string(), time.clone()))
    }

    /// NSData: the payload lives in `NS.data`
    fn decode_data(&self, fields: &Dictionary) -> Result<Node, ArchiveError> {
        let data = self.expect_field(fields, "NS.data")?;
        let bytes = data
            .as_bytes()
            .map_err(|_| ArchiveError::MalformedNode("NS.data".to_string(), data.clone()))?;
        Ok(Node::Data(bytes.to_vec()))
    }

    /// Borrow a required field of a classed dictionary
    fn expect_field<'a>(
        &self,
        fields: &'a Dictionary,
        key: &str,
    ) -> Result<&'a Node, ArchiveError> {
        fields.get(key).ok_or_else(|| {
            ArchiveError::MalformedNode(key.to_string(), Node::Dictionary(fields.clone()))
        })
    }
}

/// If the node is a single-key `{"CF$UID": n}` dictionary with a non-negative
/// number, return the table index it points at
fn uid_index(node: &Node) -> Option<usize> {
    if let Node::Dictionary(dict) = node {
        if dict.len() == 1 {
            if let Some(Node::Number(number)) = dict.get(UID_KEY) {
                if let Ok(value) = number.as_i64() {
                    if value >= 0 {
                        return Some(value as usize);
                    }
                }
            }
        }
    }
    None
}
