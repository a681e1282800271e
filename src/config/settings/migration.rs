// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::{json, Value};

/// Normalise shorthand forms before deserialising.
///
/// `pinned_buffer` may be written as `[rows, cols]`; it is rewritten to the
/// object form the struct expects.
pub(super) fn migrate_on_load(mut value: Value) -> Value {
    if let Some(map) = value.as_object_mut() {
        if let Some(Value::Array(dims)) = map.get("pinned_buffer") {
            if let [rows, cols] = dims.as_slice() {
                let replacement = json!({ "rows": rows, "cols": cols });
                map.insert("pinned_buffer".to_string(), replacement);
            }
        }
    }
    value
}
