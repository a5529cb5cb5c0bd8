// crates/trunkline-engine/src/ccml.rs
// ============================================================================
// Module: CCML Synthesizer
// Description: Emits and validates the carrier's call-control XML dialect.
// Purpose: Produce the only responses the carrier ever sees from the engine.
// Dependencies: trunkline-core, crate::secrets
// ============================================================================

//! ## Overview
//! CCML is a closed XML dialect: `Response` is the root, containing exactly
//! one `Dial` or `Hangup`; a `Dial` contains exactly one `Service` (an AI
//! voice agent endpoint) or one `Number` (an outbound trunk destination).
//! The synthesizer builds documents from typed parts, escapes every text and
//! attribute value, and renders deterministically. [`validate`] re-parses a
//! rendered document against the grammar, so tests can hold the emitted
//! bytes to the same contract the carrier does.
//!
//! Security posture: decrypted credentials pass through attribute values and
//! must never be logged; errors carry attribute names only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use thiserror::Error;
use trunkline_core::AgentProvider;
use trunkline_core::VoiceAgent;

use crate::secrets::CredentialVault;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// XML declaration prefixed to every rendered document.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Attributes allowed on `<Dial>`.
const DIAL_ATTRIBUTES: [&str; 6] =
    ["callerId", "trunks", "timeout", "maxDuration", "action", "method"];

/// Attributes allowed on `<Service>`.
const SERVICE_ATTRIBUTES: [&str; 3] = ["provider", "username", "password"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CCML synthesis or validation failure.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed credential values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CcmlError {
    /// The agent's provider requires credentials and none are stored.
    #[error("provider {0} requires credentials and the agent has none")]
    MissingCredentials(&'static str),
    /// Credential decryption failed.
    #[error("credential decryption failed for attribute {0}")]
    Decrypt(&'static str),
    /// A validated document is not well-formed.
    #[error("ccml not well-formed: {0}")]
    Malformed(String),
    /// A validated document violates the grammar.
    #[error("ccml grammar violation: {0}")]
    Grammar(String),
}

// ============================================================================
// SECTION: Document Model
// ============================================================================

/// The single leg a `<Dial>` bridges to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialLeg {
    /// AI voice agent endpoint.
    Service {
        /// Provider tag emitted on the `provider` attribute.
        provider: AgentProvider,
        /// Decrypted username, present iff the provider requires auth.
        username: Option<String>,
        /// Decrypted password, present iff the provider requires auth.
        password: Option<String>,
        /// Opaque provider-defined service value (element text).
        value: String,
    },
    /// Outbound destination number (element text).
    Number(String),
}

/// A `<Dial>` verb with its optional attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dial {
    /// Optional `callerId` attribute.
    pub caller_id: Option<String>,
    /// Optional comma-joined `trunks` attribute.
    pub trunks: Option<String>,
    /// Optional ring timeout in seconds.
    pub timeout: Option<u32>,
    /// Optional maximum call duration in seconds.
    pub max_duration: Option<u32>,
    /// The bridged leg.
    pub leg: DialLeg,
}

/// A complete CCML document.
///
/// # Invariants
/// - Renders to exactly one `Dial` or `Hangup` under `Response`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CcmlDocument {
    /// Bridge the call.
    Dial(Dial),
    /// Close the call cleanly.
    Hangup,
}

impl CcmlDocument {
    /// Renders the document with the XML declaration.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(160);
        out.push_str(XML_DECLARATION);
        out.push_str("<Response>");
        match self {
            Self::Hangup => out.push_str("<Hangup/>"),
            Self::Dial(dial) => render_dial(&mut out, dial),
        }
        out.push_str("</Response>");
        out
    }
}

/// Renders a `<Dial>` element into the buffer.
fn render_dial(out: &mut String, dial: &Dial) {
    out.push_str("<Dial");
    if let Some(caller_id) = &dial.caller_id {
        push_attribute(out, "callerId", caller_id);
    }
    if let Some(trunks) = &dial.trunks {
        push_attribute(out, "trunks", trunks);
    }
    if let Some(timeout) = dial.timeout {
        push_attribute(out, "timeout", &timeout.to_string());
    }
    if let Some(max_duration) = dial.max_duration {
        push_attribute(out, "maxDuration", &max_duration.to_string());
    }
    out.push('>');
    match &dial.leg {
        DialLeg::Service {
            provider,
            username,
            password,
            value,
        } => {
            out.push_str("<Service");
            push_attribute(out, "provider", provider.as_str());
            if let Some(username) = username {
                push_attribute(out, "username", username);
            }
            if let Some(password) = password {
                push_attribute(out, "password", password);
            }
            out.push('>');
            push_text(out, value);
            out.push_str("</Service>");
        }
        DialLeg::Number(number) => {
            out.push_str("<Number>");
            push_text(out, number);
            out.push_str("</Number>");
        }
    }
    out.push_str("</Dial>");
}

/// Appends an escaped attribute.
fn push_attribute(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, " {name}=\"{}\"", escape_attribute(value));
}

/// Appends escaped element text.
fn push_text(out: &mut String, text: &str) {
    out.push_str(&escape_text(text));
}

// ============================================================================
// SECTION: Escaping
// ============================================================================

/// Escapes element text content.
#[must_use]
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for character in raw.chars() {
        match character {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escapes an attribute value (double-quote delimited).
#[must_use]
pub fn escape_attribute(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for character in raw.chars() {
        match character {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// Synthesizes a `<Service>` dial for one voice agent.
///
/// Credentials are decrypted iff the provider's authentication set requires
/// them; providers outside the set never emit credential attributes even
/// when the agent stores a pair.
///
/// # Errors
///
/// Returns [`CcmlError`] when required credentials are missing or cannot be
/// decrypted.
pub fn dial_voice_agent(
    agent: &VoiceAgent,
    caller_id: Option<&str>,
    vault: &dyn CredentialVault,
) -> Result<CcmlDocument, CcmlError> {
    let (username, password) = if agent.provider.requires_auth() {
        let credentials = agent
            .credentials
            .as_ref()
            .ok_or(CcmlError::MissingCredentials(agent.provider.as_str()))?;
        let username =
            vault.decrypt(&credentials.username).map_err(|_| CcmlError::Decrypt("username"))?;
        let password =
            vault.decrypt(&credentials.password).map_err(|_| CcmlError::Decrypt("password"))?;
        (Some(username), Some(password))
    } else {
        (None, None)
    };
    Ok(CcmlDocument::Dial(Dial {
        caller_id: caller_id.map(ToString::to_string),
        trunks: None,
        timeout: None,
        max_duration: None,
        leg: DialLeg::Service {
            provider: agent.provider,
            username,
            password,
            value: agent.service_value.clone(),
        },
    }))
}

/// Synthesizes a dial for the member a group strategy selected.
///
/// # Errors
///
/// Returns [`CcmlError`] as [`dial_voice_agent`] does.
pub fn dial_group(
    selected_agent: &VoiceAgent,
    caller_id: Option<&str>,
    vault: &dyn CredentialVault,
) -> Result<CcmlDocument, CcmlError> {
    dial_voice_agent(selected_agent, caller_id, vault)
}

/// Trunk attributes for an outbound dial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrunkDial {
    /// Carrier trunk identifiers, emitted comma-joined when non-empty.
    pub trunk_ids: Vec<String>,
    /// Optional ring timeout in seconds.
    pub ring_timeout: Option<u32>,
    /// Optional maximum call duration in seconds.
    pub max_duration: Option<u32>,
}

/// Synthesizes a `<Number>` dial toward an outbound trunk.
#[must_use]
pub fn dial_trunk(
    destination: &str,
    trunk: Option<&TrunkDial>,
    caller_id: Option<&str>,
) -> CcmlDocument {
    let (trunks, timeout, max_duration) = trunk.map_or((None, None, None), |config| {
        let trunks = if config.trunk_ids.is_empty() {
            None
        } else {
            Some(config.trunk_ids.join(","))
        };
        (trunks, config.ring_timeout, config.max_duration)
    });
    CcmlDocument::Dial(Dial {
        caller_id: caller_id.map(ToString::to_string),
        trunks,
        timeout,
        max_duration,
        leg: DialLeg::Number(destination.to_string()),
    })
}

/// Synthesizes the clean-close response.
#[must_use]
pub const fn hangup() -> CcmlDocument {
    CcmlDocument::Hangup
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a rendered document against the CCML grammar.
///
/// Checks: well-formed XML for the closed dialect, root `Response`, exactly
/// one of `Dial`/`Hangup`, `Dial` containing exactly one `Service` or one
/// `Number`, and attribute allowlists.
///
/// # Errors
///
/// Returns [`CcmlError::Malformed`] or [`CcmlError::Grammar`].
pub fn validate(document: &str) -> Result<(), CcmlError> {
    let mut scanner = Scanner::new(document);
    scanner.skip_declaration()?;
    let root = scanner.expect_open()?;
    if root.name != "Response" {
        return Err(CcmlError::Grammar(format!("root element is {}, not Response", root.name)));
    }
    if !root.attributes.is_empty() {
        return Err(CcmlError::Grammar("Response takes no attributes".to_string()));
    }
    if root.self_closing {
        return Err(CcmlError::Grammar("Response must contain Dial or Hangup".to_string()));
    }
    let mut verbs = 0_usize;
    loop {
        match scanner.next_node()? {
            Node::Close(name) if name == "Response" => break,
            Node::Close(name) => {
                return Err(CcmlError::Malformed(format!("unexpected </{name}>")));
            }
            Node::Text(text) => {
                if !text.trim().is_empty() {
                    return Err(CcmlError::Grammar(
                        "Response contains stray text".to_string(),
                    ));
                }
            }
            Node::Open(tag) => {
                verbs += 1;
                match tag.name.as_str() {
                    "Hangup" => validate_hangup(&mut scanner, &tag)?,
                    "Dial" => validate_dial(&mut scanner, &tag)?,
                    other => {
                        return Err(CcmlError::Grammar(format!(
                            "element {other} is not allowed under Response"
                        )));
                    }
                }
            }
            Node::End => {
                return Err(CcmlError::Malformed("Response is never closed".to_string()));
            }
        }
    }
    if verbs != 1 {
        return Err(CcmlError::Grammar(format!(
            "Response must contain exactly one verb, found {verbs}"
        )));
    }
    scanner.expect_end()
}

/// Validates a `<Hangup>` element.
fn validate_hangup(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<(), CcmlError> {
    if !tag.attributes.is_empty() {
        return Err(CcmlError::Grammar("Hangup takes no attributes".to_string()));
    }
    if tag.self_closing {
        return Ok(());
    }
    match scanner.next_node()? {
        Node::Close(name) if name == "Hangup" => Ok(()),
        _ => Err(CcmlError::Grammar("Hangup must be empty".to_string())),
    }
}

/// Validates a `<Dial>` element and its single leg.
fn validate_dial(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<(), CcmlError> {
    for (name, _) in &tag.attributes {
        if !DIAL_ATTRIBUTES.contains(&name.as_str()) {
            return Err(CcmlError::Grammar(format!("Dial attribute {name} is not allowed")));
        }
    }
    if tag.self_closing {
        return Err(CcmlError::Grammar(
            "Dial must contain exactly one Service or Number".to_string(),
        ));
    }
    let mut legs = 0_usize;
    loop {
        match scanner.next_node()? {
            Node::Close(name) if name == "Dial" => break,
            Node::Close(name) => {
                return Err(CcmlError::Malformed(format!("unexpected </{name}>")));
            }
            Node::Text(text) => {
                if !text.trim().is_empty() {
                    return Err(CcmlError::Grammar("Dial contains stray text".to_string()));
                }
            }
            Node::Open(leg) => {
                legs += 1;
                match leg.name.as_str() {
                    "Service" => validate_service(scanner, &leg)?,
                    "Number" => validate_number(scanner, &leg)?,
                    other => {
                        return Err(CcmlError::Grammar(format!(
                            "element {other} is not allowed under Dial"
                        )));
                    }
                }
            }
            Node::End => {
                return Err(CcmlError::Malformed("Dial is never closed".to_string()));
            }
        }
    }
    if legs != 1 {
        return Err(CcmlError::Grammar(format!(
            "Dial must contain exactly one leg, found {legs}"
        )));
    }
    Ok(())
}

/// Validates a `<Service>` leg.
fn validate_service(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<(), CcmlError> {
    let mut has_provider = false;
    for (name, _) in &tag.attributes {
        if !SERVICE_ATTRIBUTES.contains(&name.as_str()) {
            return Err(CcmlError::Grammar(format!("Service attribute {name} is not allowed")));
        }
        if name == "provider" {
            has_provider = true;
        }
    }
    if !has_provider {
        return Err(CcmlError::Grammar("Service requires a provider attribute".to_string()));
    }
    consume_text_element(scanner, tag, "Service")
}

/// Validates a `<Number>` leg.
fn validate_number(scanner: &mut Scanner<'_>, tag: &Tag) -> Result<(), CcmlError> {
    if !tag.attributes.is_empty() {
        return Err(CcmlError::Grammar("Number takes no attributes".to_string()));
    }
    consume_text_element(scanner, tag, "Number")
}

/// Consumes the text content and closing tag of a leaf element.
fn consume_text_element(
    scanner: &mut Scanner<'_>,
    tag: &Tag,
    name: &str,
) -> Result<(), CcmlError> {
    if tag.self_closing {
        return Ok(());
    }
    loop {
        match scanner.next_node()? {
            Node::Text(_) => {}
            Node::Close(closing) if closing == name => return Ok(()),
            _ => {
                return Err(CcmlError::Grammar(format!("{name} may contain only text")));
            }
        }
    }
}

// ============================================================================
// SECTION: Scanner
// ============================================================================

/// One parsed start tag.
#[derive(Debug, Clone)]
struct Tag {
    /// Element name.
    name: String,
    /// Attributes in document order.
    attributes: Vec<(String, String)>,
    /// Whether the tag self-closed (`<Name/>`).
    self_closing: bool,
}

/// One scanned document node.
#[derive(Debug, Clone)]
enum Node {
    /// Start tag.
    Open(Tag),
    /// End tag name.
    Close(String),
    /// Raw text run (entities left encoded).
    Text(String),
    /// End of input.
    End,
}

/// Minimal scanner for the closed CCML dialect.
///
/// # Invariants
/// - Rejects comments, processing instructions (beyond the declaration),
///   CDATA, and namespaced names; the dialect has none of them.
struct Scanner<'doc> {
    /// Remaining unparsed input.
    rest: &'doc str,
}

impl<'doc> Scanner<'doc> {
    /// Creates a scanner over a document.
    const fn new(document: &'doc str) -> Self {
        Self {
            rest: document,
        }
    }

    /// Skips one optional XML declaration.
    fn skip_declaration(&mut self) -> Result<(), CcmlError> {
        let trimmed = self.rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("<?xml") {
            let end = after
                .find("?>")
                .ok_or_else(|| CcmlError::Malformed("unterminated xml declaration".to_string()))?;
            self.rest = &after[end + 2 ..];
        } else {
            self.rest = trimmed;
        }
        Ok(())
    }

    /// Scans the next node.
    fn next_node(&mut self) -> Result<Node, CcmlError> {
        if self.rest.is_empty() {
            return Ok(Node::End);
        }
        if let Some(after) = self.rest.strip_prefix("</") {
            let end = after
                .find('>')
                .ok_or_else(|| CcmlError::Malformed("unterminated end tag".to_string()))?;
            let name = after[.. end].trim().to_string();
            validate_name(&name)?;
            self.rest = &after[end + 1 ..];
            return Ok(Node::Close(name));
        }
        if let Some(after) = self.rest.strip_prefix('<') {
            if after.starts_with('!') || after.starts_with('?') {
                return Err(CcmlError::Grammar(
                    "comments, CDATA, and processing instructions are not allowed".to_string(),
                ));
            }
            let end = after
                .find('>')
                .ok_or_else(|| CcmlError::Malformed("unterminated start tag".to_string()))?;
            let raw = &after[.. end];
            self.rest = &after[end + 1 ..];
            return Ok(Node::Open(parse_tag(raw)?));
        }
        let next_tag = self.rest.find('<').unwrap_or(self.rest.len());
        let text = &self.rest[.. next_tag];
        validate_text_run(text)?;
        self.rest = &self.rest[next_tag ..];
        Ok(Node::Text(text.to_string()))
    }

    /// Expects an opening tag next.
    fn expect_open(&mut self) -> Result<Tag, CcmlError> {
        match self.next_node()? {
            Node::Open(tag) => Ok(tag),
            Node::Text(text) if text.trim().is_empty() => self.expect_open(),
            _ => Err(CcmlError::Malformed("expected a start tag".to_string())),
        }
    }

    /// Expects only trailing whitespace.
    fn expect_end(&mut self) -> Result<(), CcmlError> {
        loop {
            match self.next_node()? {
                Node::End => return Ok(()),
                Node::Text(text) if text.trim().is_empty() => {}
                _ => {
                    return Err(CcmlError::Grammar(
                        "content found after the Response element".to_string(),
                    ));
                }
            }
        }
    }
}

/// Parses a start tag body (`Name attr="value" ... [/]`).
fn parse_tag(raw: &str) -> Result<Tag, CcmlError> {
    let (raw, self_closing) = raw
        .strip_suffix('/')
        .map_or((raw, false), |stripped| (stripped, true));
    let mut characters = raw.char_indices();
    let name_end = characters
        .find(|(_, character)| character.is_whitespace())
        .map_or(raw.len(), |(index, _)| index);
    let name = raw[.. name_end].to_string();
    validate_name(&name)?;
    let mut attributes = Vec::new();
    let mut rest = raw[name_end ..].trim_start();
    while !rest.is_empty() {
        let equals = rest
            .find('=')
            .ok_or_else(|| CcmlError::Malformed(format!("attribute without value in <{name}>")))?;
        let attribute_name = rest[.. equals].trim().to_string();
        validate_name(&attribute_name)?;
        let after_equals = rest[equals + 1 ..].trim_start();
        let Some(after_quote) = after_equals.strip_prefix('"') else {
            return Err(CcmlError::Malformed(format!(
                "attribute {attribute_name} is not double-quoted"
            )));
        };
        let closing = after_quote.find('"').ok_or_else(|| {
            CcmlError::Malformed(format!("attribute {attribute_name} is unterminated"))
        })?;
        let value = &after_quote[.. closing];
        validate_text_run(value)?;
        attributes.push((attribute_name, value.to_string()));
        rest = after_quote[closing + 1 ..].trim_start();
    }
    Ok(Tag {
        name,
        attributes,
        self_closing,
    })
}

/// Validates an element or attribute name.
fn validate_name(name: &str) -> Result<(), CcmlError> {
    let valid = !name.is_empty()
        && name.chars().all(|character| character.is_ascii_alphanumeric() || character == '_');
    if valid {
        Ok(())
    } else {
        Err(CcmlError::Malformed(format!("invalid name {name:?}")))
    }
}

/// Validates a text run: raw `<` is impossible here, raw `&` must start a
/// known entity, and `"`/`>` are tolerated per the XML spec.
fn validate_text_run(text: &str) -> Result<(), CcmlError> {
    let mut rest = text;
    while let Some(position) = rest.find('&') {
        let tail = &rest[position ..];
        let known = ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"]
            .iter()
            .any(|entity| tail.starts_with(entity));
        if !known {
            return Err(CcmlError::Malformed("unescaped ampersand in content".to_string()));
        }
        rest = &tail[1 ..];
    }
    Ok(())
}
