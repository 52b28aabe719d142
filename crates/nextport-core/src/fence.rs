//! Extraction of the first fenced code block from a model reply.
//!
//! Model replies are free text with no schema guarantee. The converted code is
//! conventionally wrapped in a triple-backtick fence, optionally tagged with a
//! language on the opening line. [`parse_fence`] classifies the reply into one
//! of three shapes so callers decide explicitly what to do with each.

const DELIMITER: &str = "```";

/// Language tags stripped from the first line of a fenced block.
pub const LANGUAGE_TAGS: &[&str] = &["tsx", "jsx", "js", "ts"];

/// Shape of a model reply with respect to code fences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fence {
    /// The reply contains no fence delimiter at all.
    NoFence,
    /// A delimiter is present but the fence is never closed.
    Malformed,
    /// The first complete fenced block.
    Block {
        /// Recognised language tag removed from the opening line, if any.
        lang: Option<String>,
        /// Trimmed block body without the tag line.
        code: String,
    },
}

impl Fence {
    /// Resolve to the text a caller should return.
    ///
    /// `NoFence` and `Malformed` fall back to the whole trimmed reply.
    pub fn into_code(self, reply: &str) -> String {
        match self {
            Fence::Block { code, .. } => code,
            Fence::NoFence | Fence::Malformed => reply.trim().to_owned(),
        }
    }
}

/// Classify `reply` and extract its first fenced block.
pub fn parse_fence(reply: &str) -> Fence {
    let reply = reply.trim();
    if !reply.contains(DELIMITER) {
        return Fence::NoFence;
    }

    let mut segments = reply.split(DELIMITER);
    // Text before the opening delimiter.
    segments.next();
    let (Some(body), Some(_)) = (segments.next(), segments.next()) else {
        return Fence::Malformed;
    };

    let body = body.trim();
    let mut lines = body.lines();
    let first = lines.next().map(str::trim).unwrap_or_default();

    if LANGUAGE_TAGS.contains(&first) {
        let code = lines.collect::<Vec<_>>().join("\n").trim().to_owned();
        Fence::Block {
            lang: Some(first.to_owned()),
            code,
        }
    } else {
        Fence::Block {
            lang: None,
            code: body.to_owned(),
        }
    }
}
