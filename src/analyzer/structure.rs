use serde_json::{json, Map, Value};

pub const MAX_DEPTH: usize = 5;

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Recursively-shaped description of a JSON document, computed with an
/// explicit worklist so pathological nesting can never exhaust the call
/// stack. Nodes past [`MAX_DEPTH`] collapse to a sentinel.
pub fn shape_of(data: &Value) -> Value {
    let mut shape = Value::Null;
    // (input pointer, output pointer, depth)
    let mut work: Vec<(String, String, usize)> = vec![(String::new(), String::new(), 0)];

    while let Some((in_ptr, out_ptr, depth)) = work.pop() {
        let Some(node) = data.pointer(&in_ptr) else {
            continue;
        };

        let rendered = if depth > MAX_DEPTH {
            json!({ "type": "max_depth_reached" })
        } else {
            match node {
                Value::Object(fields) => {
                    let mut out = Map::new();
                    for key in fields.keys() {
                        out.insert(key.clone(), Value::Null);
                        let token = escape_pointer_token(key);
                        work.push((
                            format!("{in_ptr}/{token}"),
                            format!("{out_ptr}/{token}"),
                            depth + 1,
                        ));
                    }
                    Value::Object(out)
                }
                Value::Array(items) => {
                    if !items.is_empty() {
                        work.push((
                            format!("{in_ptr}/0"),
                            format!("{out_ptr}/sample"),
                            depth + 1,
                        ));
                    }
                    json!({ "type": "array", "sample": Value::Null })
                }
                scalar => json!({ "type": kind_name(scalar) }),
            }
        };

        if let Some(slot) = shape.pointer_mut(&out_ptr) {
            *slot = rendered;
        }
    }

    shape
}
