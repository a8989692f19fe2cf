/*!
 The class-handler registry used to decode archived classes that have no
 built-in decoder.

 Handlers are pure functions from an already-resolved dictionary to a node.
 The registry is the only process-wide state in the crate: it is seeded with
 the default handlers on first use, [`register_class_handler`] may add more at
 runtime, and every [`Unarchiver`](crate::unarchiver::Unarchiver) clones an
 immutable snapshot at construction. An instance therefore keeps the registry
 view it was born with, and decoding itself never takes a lock.
*/

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

use crate::{
    plist::models::{Dictionary, Node},
    unarchiver::handlers,
};

/// A pure function mapping an archived class dictionary, fields already
/// resolved, onto a plain node
pub type ClassHandler = Arc<dyn Fn(&Dictionary) -> Node + Send + Sync>;

/// Process-wide handler table, seeded with the defaults on first use
static REGISTRY: LazyLock<RwLock<HashMap<String, ClassHandler>>> =
    LazyLock::new(|| RwLock::new(default_table()));

/// The handlers every registry starts with
fn default_table() -> HashMap<String, ClassHandler> {
    let defaults: &[(&str, fn(&Dictionary) -> Node)] = &[
        ("NSColor", handlers::decode_color),
        ("NSAttributedString", handlers::decode_attributed_string),
        ("NSMutableAttributedString", handlers::decode_attributed_string),
        ("NSURLRequest", handlers::decode_url_request),
        ("NSMutableURLRequest", handlers::decode_url_request),
        ("NSURL", handlers::decode_url),
        ("NSValue", handlers::decode_value),
        ("NSNumber", handlers::decode_number),
        ("NSDecimalNumber", handlers::decode_decimal_number),
        ("NSTimeZone", handlers::decode_time_zone),
        ("NSLocale", handlers::decode_locale),
        ("NSRange", handlers::decode_range),
        ("NSPoint", handlers::decode_point),
        ("NSSize", handlers::decode_size),
        ("NSRect", handlers::decode_rect),
    ];

    let mut table = HashMap::with_capacity(defaults.len());
    for (name, handler) in defaults {
        table.insert(name.to_string(), Arc::new(*handler) as ClassHandler);
    }
    table
}

/// Register a handler for an archived class name (exact, case-sensitive).
///
/// The handler is used by unarchivers constructed after this call; instances
/// constructed earlier retain their snapshot. Registering an existing name
/// replaces its handler.
pub fn register_class_handler<F>(name: impl Into<String>, handler: F)
where
    F: Fn(&Dictionary) -> Node + Send + Sync + 'static,
{
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.into(), Arc::new(handler));
}

/// Clone the current handler table
pub(crate) fn snapshot() -> HashMap<String, ClassHandler> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
