//! Wire protocol for the `/synth` message channel.
//!
//! Both directions use flat token sequences. Outbound (to the engine):
//! `[synthType, action, key, value, key, value, ...]`. Inbound (from the
//! engine): `[synthType, nodeId, event, key, value, ...]`. The engine assigns
//! node ids, so outbound `play` carries no id field at all — the id first
//! appears in the `created` confirmation.
//!
//! Inbound values arrive as text and stay text; only the node id is coerced
//! (a non-numeric id makes the whole event unparseable, by design — dropping
//! one malformed event is safer than guessing).

use std::fmt;

/// A single protocol token. The channel is untyped on the wire; this enum
/// keeps outbound numbers as numbers until encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

// ─── Outbound messages ─────────────────────────────────────────────────────

/// Request verbs the bridge sends to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Play,
    Update,
    Kill,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Play => "play",
            Action::Update => "update",
            Action::Kill => "kill",
        }
    }
}

/// One outbound request: synth type, verb, and a flat key/value field list.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub synth_type: String,
    pub action: Action,
    pub fields: Vec<(String, Value)>,
}

impl OutboundMessage {
    /// A `play` request for one voice. No id field — the engine assigns ids.
    pub fn play(synth_type: &str, name: &str, freq: f64, params: &[(String, Value)]) -> Self {
        let mut fields = vec![
            ("name".to_string(), Value::Str(name.to_string())),
            ("freq".to_string(), Value::Float(freq)),
        ];
        fields.extend(params.iter().cloned());
        Self {
            synth_type: synth_type.to_string(),
            action: Action::Play,
            fields,
        }
    }

    /// An `update` request addressing one live voice by its engine-assigned id.
    pub fn update(synth_type: &str, id: i64, params: &[(String, Value)]) -> Self {
        let mut fields = vec![("id".to_string(), Value::Int(id))];
        fields.extend(params.iter().cloned());
        Self {
            synth_type: synth_type.to_string(),
            action: Action::Update,
            fields,
        }
    }

    /// A `kill` request addressing one live voice by id.
    pub fn kill(synth_type: &str, id: i64) -> Self {
        Self {
            synth_type: synth_type.to_string(),
            action: Action::Kill,
            fields: vec![("id".to_string(), Value::Int(id))],
        }
    }

    /// Flatten to the wire token sequence.
    pub fn tokens(&self) -> Vec<Value> {
        let mut out = vec![
            Value::Str(self.synth_type.clone()),
            Value::Str(self.action.as_str().to_string()),
        ];
        for (k, v) in &self.fields {
            out.push(Value::Str(k.clone()));
            out.push(v.clone());
        }
        out
    }

    /// Space-joined token line, the datagram payload of the UDP bus.
    ///
    /// Tokens must be whitespace-free; the external OSC layer owns real
    /// framing when one is in play.
    pub fn encode(&self) -> String {
        self.tokens()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Value of a named field, if present.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

// ─── Inbound events ────────────────────────────────────────────────────────

/// Confirmation verbs the engine reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Killed,
}

/// One confirmation event from the engine.
///
/// Params stay textual; consumers coerce per column as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub synth_type: String,
    pub id: i64,
    pub kind: EventKind,
    pub params: Vec<(String, String)>,
}

/// Why an inbound token sequence was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("event needs at least [synthType, id, event], got {0} tokens")]
    TooShort(usize),
    #[error("non-numeric node id {0:?}")]
    BadId(String),
    #[error("unknown event tag {0:?}")]
    UnknownEvent(String),
    #[error("odd-length param list ({0} tokens after the event tag)")]
    OddParams(usize),
}

impl InboundEvent {
    /// Parse a whitespace-tokenized datagram line.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        Self::parse(&tokens)
    }

    /// Parse an already-split token sequence:
    /// `[synthType, nodeId, created|updated|killed, key, value, ...]`.
    pub fn parse(tokens: &[&str]) -> Result<Self, ParseError> {
        if tokens.len() < 3 {
            return Err(ParseError::TooShort(tokens.len()));
        }
        let synth_type = tokens[0].to_string();
        let id: i64 = tokens[1]
            .parse()
            .map_err(|_| ParseError::BadId(tokens[1].to_string()))?;
        let kind = match tokens[2] {
            "created" => EventKind::Created,
            "updated" => EventKind::Updated,
            "killed" => EventKind::Killed,
            other => return Err(ParseError::UnknownEvent(other.to_string())),
        };
        let rest = &tokens[3..];
        if rest.len() % 2 != 0 {
            return Err(ParseError::OddParams(rest.len()));
        }
        let params = rest
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();
        Ok(Self {
            synth_type,
            id,
            kind,
            params,
        })
    }

    /// Param value by name, if the event carried it.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
