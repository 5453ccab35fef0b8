//! Macro parameter normalisation.

use std::collections::BTreeMap;

use serde_json::Value;

/// Parameters handed to a macro engine, keyed by lower-cased name.
pub type MacroParams = BTreeMap<String, Value>;

/// Lower-case every key and entity-decode string values. Other values pass
/// through untouched.
pub fn normalize<I>(params: I) -> MacroParams
where
    I: IntoIterator<Item = (String, Value)>,
{
    params
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => Value::String(decode_entities(&text)),
                other => other,
            };
            (key.to_lowercase(), value)
        })
        .collect()
}

/// Decode named (`&amp;` `&lt;` `&gt;` `&quot;` `&apos;` `&nbsp;`) and
/// numeric (`&#39;`, `&#x27;`) character references. Unknown references are
/// kept verbatim.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').and_then(|end| {
            let reference = &tail[1..end];
            decode_reference(reference).map(|ch| (ch, end))
        }) {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(numeric) = reference.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code);
    }
    match reference {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}
