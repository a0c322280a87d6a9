//! Feature manifest (`.mf`) header parsing and rendering
//!
//! Headers are `Name: value` lines. A line starting with a single space
//! continues the previous header, which is how long values are wrapped at
//! 72 bytes.

use indexmap::IndexMap;
use keel_core::error::CatalogError;
use keel_core::types::{default_short_name, ContentEntry, FeatureManifest, FeatureToken, Platform, Version};

pub const SYMBOLIC_NAME: &str = "Subsystem-SymbolicName";
pub const VERSION: &str = "Subsystem-Version";
pub const SHORT_NAME: &str = "IBM-ShortName";
pub const PLATFORM: &str = "WLP-Platform";
pub const CONTENT: &str = "Subsystem-Content";
pub const SIGNING_KEY_ID: &str = "WLP-Signing-Key-Id";
pub const SIGNATURE: &str = "WLP-Signature";
pub const LICENSE: &str = "Subsystem-License";

const FEATURE_TYPE: &str = "osgi.subsystem.feature";
const LINE_WIDTH: usize = 72;

/// One clause of a header list value (`name; attr=value; dir:=value`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub directives: IndexMap<String, String>,
}

/// Parse manifest text into a [`FeatureManifest`]
pub fn parse_manifest(text: &str, origin: &str) -> Result<FeatureManifest, CatalogError> {
    let headers = parse_headers(text).map_err(|reason| CatalogError::malformed(origin, reason))?;
    manifest_from_headers(headers, origin)
}

/// Build a manifest from already split headers
pub fn manifest_from_headers(
    headers: IndexMap<String, String>,
    origin: &str,
) -> Result<FeatureManifest, CatalogError> {
    let header = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    };

    let symbolic_name = header(SYMBOLIC_NAME)
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CatalogError::malformed(origin, format!("missing {}", SYMBOLIC_NAME)))?;

    let version_text =
        header(VERSION).ok_or_else(|| CatalogError::malformed(origin, format!("missing {}", VERSION)))?;
    let version: Version = version_text
        .parse()
        .map_err(|e| CatalogError::malformed(origin, format!("{}: {}", VERSION, e)))?;

    let short_name = header(SHORT_NAME)
        .map(str::to_string)
        .unwrap_or_else(|| default_short_name(&symbolic_name).to_string());

    let mut manifest = FeatureManifest::new(symbolic_name, short_name, version);

    if let Some(platforms) = header(PLATFORM) {
        for raw in split_top_level(platforms, ',') {
            let platform: Platform = raw
                .parse()
                .map_err(|e| CatalogError::malformed(origin, format!("{}: {}", PLATFORM, e)))?;
            manifest.platforms.insert(platform);
        }
    }

    if let Some(content) = header(CONTENT) {
        for clause in parse_clauses(content) {
            let kind = clause.attributes.get("type").map(String::as_str);
            if kind == Some(FEATURE_TYPE) {
                manifest.dependencies.push(FeatureToken::parse(&clause.name));
            } else if let Some(location) = clause.directives.get("location") {
                manifest.content.push(ContentEntry {
                    path: location.clone(),
                    locator: location.clone(),
                });
            }
        }
    }

    manifest.signing_key_id = header(SIGNING_KEY_ID).map(str::to_string);
    manifest.signature = header(SIGNATURE).map(str::to_string);
    manifest.license = header(LICENSE).map(str::to_string);
    manifest.headers = headers;

    Ok(manifest)
}

/// Split manifest text into ordered headers
pub fn parse_headers(text: &str) -> Result<IndexMap<String, String>, String> {
    let mut headers: IndexMap<String, String> = IndexMap::new();
    let mut last: Option<String> = None;

    for (number, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            let key = last
                .as_ref()
                .ok_or_else(|| format!("line {}: continuation without a header", number + 1))?;
            if let Some(value) = headers.get_mut(key) {
                value.push_str(continuation);
            }
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("line {}: expected 'Name: value'", number + 1))?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(format!("line {}: invalid header name '{}'", number + 1, name));
        }
        headers.insert(name.to_string(), value.strip_prefix(' ').unwrap_or(value).to_string());
        last = Some(name.to_string());
    }

    Ok(headers)
}

/// Render a manifest back to header text, wrapping at 72 bytes
pub fn render_manifest(manifest: &FeatureManifest) -> String {
    let mut headers = manifest.headers.clone();
    if headers.is_empty() {
        headers.insert(SYMBOLIC_NAME.to_string(), manifest.symbolic_name.clone());
        headers.insert(VERSION.to_string(), manifest.version.to_string());
        headers.insert(SHORT_NAME.to_string(), manifest.short_name.clone());
        if !manifest.platforms.is_empty() {
            let platforms: Vec<String> = manifest.platforms.iter().map(ToString::to_string).collect();
            headers.insert(PLATFORM.to_string(), platforms.join(","));
        }
        let mut content: Vec<String> = manifest
            .dependencies
            .iter()
            .map(|token| format!("{}; type=\"{}\"", token, FEATURE_TYPE))
            .collect();
        content.extend(
            manifest
                .content
                .iter()
                .map(|entry| format!("{}; type=\"file\"; location:=\"{}\"", entry.locator, entry.path)),
        );
        if !content.is_empty() {
            headers.insert(CONTENT.to_string(), content.join(","));
        }
        if let Some(key) = &manifest.signing_key_id {
            headers.insert(SIGNING_KEY_ID.to_string(), key.clone());
        }
        if let Some(signature) = &manifest.signature {
            headers.insert(SIGNATURE.to_string(), signature.clone());
        }
        if let Some(license) = &manifest.license {
            headers.insert(LICENSE.to_string(), license.clone());
        }
    }

    let mut out = String::new();
    for (name, value) in &headers {
        wrap_header(&mut out, &format!("{}: {}", name, value));
    }
    out
}

fn wrap_header(out: &mut String, line: &str) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > LINE_WIDTH {
            out.push_str("\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push('\n');
}

/// Parse a list header value into clauses
pub fn parse_clauses(value: &str) -> Vec<Clause> {
    split_top_level(value, ',')
        .into_iter()
        .filter_map(|raw| {
            let mut parts = split_top_level(&raw, ';').into_iter();
            let name = parts.next()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let mut clause = Clause {
                name,
                attributes: IndexMap::new(),
                directives: IndexMap::new(),
            };
            for part in parts {
                if let Some((key, value)) = part.split_once(":=") {
                    clause
                        .directives
                        .insert(key.trim().to_string(), unquote(value));
                } else if let Some((key, value)) = part.split_once('=') {
                    clause
                        .attributes
                        .insert(key.trim().to_string(), unquote(value));
                }
            }
            Some(clause)
        })
        .collect()
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}

/// Split on a separator that is not inside double quotes
fn split_top_level(value: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in value.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            },
            c if c == separator && !quoted => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            },
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
