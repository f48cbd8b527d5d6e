//! Instruction templates.
//!
//! A small Handlebars-flavoured language that turns a validated task input into a
//! [`RenderedRequest`]:
//!
//! | Tag | Effect |
//! | --- | --- |
//! | `{{path}}` | insert the value at a dotted path |
//! | `{{media url=path}}` | emit a media part from the data URI at `path` |
//! | `{{#if path}}..{{else}}..{{/if}}` | truthiness branch |
//! | `{{#eq path "literal"}}..{{else}}..{{/eq}}` | branch on a field's value |
//! | `{{#each path}}..{{/each}}` | iterate a list (`{{this}}`, `{{this.field}}`, `{{@index}}`) |
//!
//! Templates are parsed once, up front; rendering never touches the network and is
//! deterministic for a given input.
//!
//! ```
//! use serde_json::json;
//! use toolflow::template::{Part, Template};
//!
//! let template = Template::parse(
//!     "Minify this {{language}}.{{#eq language \"html\"}} Keep comments out.{{/eq}}\n{{code}}",
//! )
//! .unwrap();
//!
//! let request = template
//!     .render(&json!({ "language": "html", "code": "<p> hi </p>" }))
//!     .unwrap();
//! assert_eq!(
//!     request.parts(),
//!     &[Part::Text("Minify this html. Keep comments out.\n<p> hi </p>".into())]
//! );
//! ```

mod rendered;

pub use rendered::{Part, RenderedRequest, RenderedRequestBuilder};

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::contract::{DataUri, Validated};

/// Template parse and render failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `{{` without a matching `}}`.
    #[error("unterminated tag starting at byte {offset}")]
    Unterminated {
        /// Byte offset of the opening braces.
        offset: usize,
    },

    /// A tag that is not part of the grammar.
    #[error("invalid tag '{{{{{0}}}}}'")]
    InvalidTag(String),

    /// `{{#name ..}}` with an unsupported helper.
    #[error("unknown block helper '#{0}'")]
    UnknownHelper(String),

    /// A closing tag that does not match the open block.
    #[error("'{{{{/{found}}}}}' closes a '#{expected}' block")]
    MismatchedClose {
        /// The helper of the innermost open block.
        expected: String,
        /// The helper named by the closing tag.
        found: String,
    },

    /// A closing tag with no block open.
    #[error("'{{{{/{0}}}}}' has no matching opening tag")]
    UnexpectedClose(String),

    /// A block left open at the end of the template.
    #[error("'#{0}' block is never closed")]
    UnclosedBlock(String),

    /// `{{else}}` outside an `if`/`eq` block, or twice in one block.
    #[error("'{{{{else}}}}' is not allowed here")]
    StrayElse,

    /// `this` or `@index` used outside `#each`.
    #[error("'{0}' is only available inside '#each'")]
    ThisOutsideEach(String),

    /// `{{media url=..}}` pointed at an absent or null field.
    #[error("media field '{0}' is missing")]
    MissingMedia(String),

    /// `{{media url=..}}` pointed at something that is not a well-formed data URI.
    #[error("media field '{path}' is not a valid data URI: {reason}")]
    InvalidMedia {
        /// Path of the field.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// `{{#each ..}}` pointed at a value that is not a list.
    #[error("'{0}' is not a list")]
    NotAList(String),

    /// The render input was not a JSON object.
    #[error("template input must be an object, got {0}")]
    InvalidInput(String),
}

/// A value reference inside a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ref {
    /// Dotted path from the input root.
    Root(Vec<String>),
    /// `this` or `this.a.b` inside `#each`.
    This(Vec<String>),
    /// `@index` inside `#each`.
    Index,
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(path) => write!(f, "{}", path.join(".")),
            Self::This(path) if path.is_empty() => write!(f, "this"),
            Self::This(path) => write!(f, "this.{}", path.join(".")),
            Self::Index => write!(f, "@index"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var(Ref),
    Media(Ref),
    If {
        cond: Ref,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Eq {
        subject: Ref,
        literal: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Each {
        list: Ref,
        body: Vec<Node>,
    },
}

/// A parsed instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse a template.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let (nodes, stop) = parser.block(0)?;
        match stop {
            Stop::End => Ok(Self {
                source: source.to_string(),
                nodes,
            }),
            Stop::Else => Err(TemplateError::StrayElse),
            Stop::Close(name) => Err(TemplateError::UnexpectedClose(name)),
        }
    }

    /// The template text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against a JSON object.
    pub fn render(&self, input: &Value) -> Result<RenderedRequest, TemplateError> {
        if !input.is_object() {
            return Err(TemplateError::InvalidInput(json_kind(input).to_string()));
        }
        let mut out = RenderedRequest::builder();
        let mut scope = Scope {
            root: input,
            frames: Vec::new(),
        };
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out.build())
    }

    /// Render against a contract-validated input.
    pub fn render_validated(&self, input: &Validated) -> Result<RenderedRequest, TemplateError> {
        self.render(input.as_value())
    }
}

// ---------------------------------------------------------------------------
// Tokenizing

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Tag(&'a str),
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut offset = 0;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            tokens.push(Token::Text(&rest[..open]));
        }
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or(TemplateError::Unterminated {
                offset: offset + open,
            })?;
        tokens.push(Token::Tag(after_open[..close].trim()));
        let consumed = open + 2 + close + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(\w+)(?:\s+(.*))?$").expect("open tag pattern is valid"));
static CLOSE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(\w+)$").expect("close tag pattern is valid"));
static MEDIA_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^media\s+url=(\S+)$").expect("media tag pattern is valid")
});
static EQ_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\S+)\s+"([^"]*)"$"#).expect("eq arguments pattern is valid")
});
static PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:@index|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)$")
        .expect("path pattern is valid")
});

// ---------------------------------------------------------------------------
// Parsing

enum Stop {
    End,
    Else,
    Close(String),
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl Parser<'_> {
    /// Parse nodes until end of input, `{{else}}` or a closing tag.
    fn block(&mut self, each_depth: usize) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.get(self.pos) {
            self.pos += 1;
            let tag = match *token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text.to_string()));
                    continue;
                },
                Token::Tag(tag) => tag,
            };

            if tag == "else" {
                return Ok((nodes, Stop::Else));
            }
            if let Some(caps) = CLOSE_TAG.captures(tag) {
                return Ok((nodes, Stop::Close(caps[1].to_string())));
            }
            if let Some(caps) = OPEN_TAG.captures(tag) {
                let helper = caps[1].to_string();
                let args = caps.get(2).map_or("", |m| m.as_str().trim());
                nodes.push(self.open_block(&helper, args, each_depth)?);
                continue;
            }
            if let Some(caps) = MEDIA_TAG.captures(tag) {
                nodes.push(Node::Media(parse_ref(&caps[1], each_depth)?));
                continue;
            }
            if PATH.is_match(tag) {
                nodes.push(Node::Var(parse_ref(tag, each_depth)?));
                continue;
            }
            return Err(TemplateError::InvalidTag(tag.to_string()));
        }
        Ok((nodes, Stop::End))
    }

    fn open_block(
        &mut self,
        helper: &str,
        args: &str,
        each_depth: usize,
    ) -> Result<Node, TemplateError> {
        match helper {
            "if" => {
                let cond = parse_ref(args, each_depth)?;
                let (then, otherwise) = self.branches(helper, each_depth)?;
                Ok(Node::If {
                    cond,
                    then,
                    otherwise,
                })
            },
            "eq" => {
                let caps = EQ_ARGS
                    .captures(args)
                    .ok_or_else(|| TemplateError::InvalidTag(format!("#eq {args}")))?;
                let subject = parse_ref(&caps[1], each_depth)?;
                let literal = caps[2].to_string();
                let (then, otherwise) = self.branches(helper, each_depth)?;
                Ok(Node::Eq {
                    subject,
                    literal,
                    then,
                    otherwise,
                })
            },
            "each" => {
                let list = parse_ref(args, each_depth)?;
                let (body, stop) = self.block(each_depth + 1)?;
                self.expect_close(helper, stop)?;
                Ok(Node::Each { list, body })
            },
            other => Err(TemplateError::UnknownHelper(other.to_string())),
        }
    }

    fn branches(
        &mut self,
        helper: &str,
        each_depth: usize,
    ) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
        let (then, stop) = self.block(each_depth)?;
        if let Stop::Else = stop {
            let (otherwise, stop) = self.block(each_depth)?;
            self.expect_close(helper, stop)?;
            return Ok((then, otherwise));
        }
        self.expect_close(helper, stop)?;
        Ok((then, Vec::new()))
    }

    fn expect_close(&self, helper: &str, stop: Stop) -> Result<(), TemplateError> {
        match stop {
            Stop::Close(name) if name == helper => Ok(()),
            Stop::Close(name) => Err(TemplateError::MismatchedClose {
                expected: helper.to_string(),
                found: name,
            }),
            Stop::Else => Err(TemplateError::StrayElse),
            Stop::End => Err(TemplateError::UnclosedBlock(helper.to_string())),
        }
    }
}

fn parse_ref(raw: &str, each_depth: usize) -> Result<Ref, TemplateError> {
    if !PATH.is_match(raw) {
        return Err(TemplateError::InvalidTag(raw.to_string()));
    }
    let mut segments = raw.split('.').map(str::to_string);
    let head = segments.next().unwrap_or_default();
    let reference = match head.as_str() {
        "@index" => Ref::Index,
        "this" => Ref::This(segments.collect()),
        _ => Ref::Root(std::iter::once(head).chain(segments).collect()),
    };
    if each_depth == 0 && !matches!(reference, Ref::Root(_)) {
        return Err(TemplateError::ThisOutsideEach(raw.to_string()));
    }
    Ok(reference)
}

// ---------------------------------------------------------------------------
// Rendering

struct Frame<'v> {
    item: &'v Value,
    index: usize,
}

struct Scope<'v> {
    root: &'v Value,
    frames: Vec<Frame<'v>>,
}

enum Resolved<'v> {
    Value(&'v Value),
    Index(usize),
    Absent,
}

impl<'v> Scope<'v> {
    fn resolve(&self, reference: &Ref) -> Resolved<'v> {
        match reference {
            Ref::Root(path) => walk(self.root, path),
            Ref::This(path) => match self.frames.last() {
                Some(frame) => walk(frame.item, path),
                None => Resolved::Absent,
            },
            Ref::Index => self
                .frames
                .last()
                .map_or(Resolved::Absent, |frame| Resolved::Index(frame.index)),
        }
    }
}

fn walk<'v>(start: &'v Value, path: &[String]) -> Resolved<'v> {
    let mut current = start;
    for segment in path {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Resolved::Absent,
        }
    }
    Resolved::Value(current)
}

fn render_nodes<'v>(
    nodes: &[Node],
    scope: &mut Scope<'v>,
    out: &mut RenderedRequestBuilder,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_text(text),
            Node::Var(reference) => out.push_value(&display(&scope.resolve(reference))),
            Node::Media(reference) => out.push_media(media(scope, reference)?),
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if truthy(&scope.resolve(cond)) {
                    then
                } else {
                    otherwise
                };
                render_nodes(branch, scope, out)?;
            },
            Node::Eq {
                subject,
                literal,
                then,
                otherwise,
            } => {
                let branch = if display(&scope.resolve(subject)) == *literal {
                    then
                } else {
                    otherwise
                };
                render_nodes(branch, scope, out)?;
            },
            Node::Each { list, body } => {
                let items = match scope.resolve(list) {
                    Resolved::Absent | Resolved::Value(Value::Null) => continue,
                    Resolved::Value(Value::Array(items)) => items,
                    Resolved::Value(_) | Resolved::Index(_) => {
                        return Err(TemplateError::NotAList(list.to_string()))
                    },
                };
                for (index, item) in items.iter().enumerate() {
                    scope.frames.push(Frame { item, index });
                    let rendered = render_nodes(body, scope, out);
                    scope.frames.pop();
                    rendered?;
                }
            },
        }
    }
    Ok(())
}

fn media(scope: &Scope<'_>, reference: &Ref) -> Result<DataUri, TemplateError> {
    match scope.resolve(reference) {
        Resolved::Absent | Resolved::Value(Value::Null) => {
            Err(TemplateError::MissingMedia(reference.to_string()))
        },
        Resolved::Value(Value::String(raw)) => {
            DataUri::parse(raw).map_err(|e| TemplateError::InvalidMedia {
                path: reference.to_string(),
                reason: e.to_string(),
            })
        },
        Resolved::Value(other) => Err(TemplateError::InvalidMedia {
            path: reference.to_string(),
            reason: format!("expected a string, got {}", json_kind(other)),
        }),
        Resolved::Index(_) => Err(TemplateError::InvalidMedia {
            path: reference.to_string(),
            reason: "expected a string, got a number".to_string(),
        }),
    }
}

fn display(resolved: &Resolved<'_>) -> String {
    match resolved {
        Resolved::Absent | Resolved::Value(Value::Null) => String::new(),
        Resolved::Value(Value::String(s)) => s.clone(),
        Resolved::Value(other) => other.to_string(),
        Resolved::Index(index) => index.to_string(),
    }
}

fn truthy(resolved: &Resolved<'_>) -> bool {
    match resolved {
        Resolved::Absent => false,
        Resolved::Index(index) => *index != 0,
        Resolved::Value(value) => match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(_) => true,
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn render(source: &str, input: Value) -> Result<RenderedRequest, TemplateError> {
        Template::parse(source)?.render(&input)
    }

    fn text(source: &str, input: Value) -> String {
        render(source, input).unwrap().text()
    }

    #[test]
    fn substitutes_values() {
        assert_eq!(
            text(
                "{{name}} has {{count}} items, done={{done}}, tags={{tags}}, note=[{{note}}]",
                json!({"name": "Ada", "count": 3, "done": false, "tags": ["a", "b"], "note": null})
            ),
            r#"Ada has 3 items, done=false, tags=["a","b"], note=[]"#
        );
    }

    #[test]
    fn nested_paths() {
        assert_eq!(
            text("{{user.name}}/{{user.missing}}", json!({"user": {"name": "Ada"}})),
            "Ada/"
        );
    }

    #[test]
    fn values_keep_edge_whitespace_but_literals_do_not() {
        assert_eq!(
            text("\n  Format this:\n{{code}}\n", json!({"code": "a {}\n\n   "})),
            "Format this:\na {}\n\n   "
        );
        assert_eq!(text("  {{code}}  ", json!({"code": "  x  "})), "  x  ");
    }

    #[test]
    fn media_splits_text() {
        let request = render(
            "Extract text from this image.\n{{media url=image}}\nReturn JSON.",
            json!({"image": PNG}),
        )
        .unwrap();
        assert_eq!(
            request.parts(),
            &[
                Part::Text("Extract text from this image.".into()),
                Part::Media(DataUri::parse(PNG).unwrap()),
                Part::Text("Return JSON.".into()),
            ]
        );
    }

    #[test]
    fn missing_and_invalid_media_are_errors() {
        assert_eq!(
            render("{{media url=image}}", json!({})),
            Err(TemplateError::MissingMedia("image".into()))
        );
        assert!(matches!(
            render("{{media url=image}}", json!({"image": "nope"})),
            Err(TemplateError::InvalidMedia { .. })
        ));
        assert!(matches!(
            render("{{media url=image}}", json!({"image": 7})),
            Err(TemplateError::InvalidMedia { .. })
        ));
    }

    #[test]
    fn if_else_uses_truthiness() {
        let source = "{{#if source}}from {{source}}{{else}}auto-detect{{/if}}";
        assert_eq!(text(source, json!({"source": "French"})), "from French");
        assert_eq!(text(source, json!({"source": ""})), "auto-detect");
        assert_eq!(text(source, json!({})), "auto-detect");
        assert_eq!(text(source, json!({"source": []})), "auto-detect");
        assert_eq!(text(source, json!({"source": 0})), "auto-detect");
    }

    #[test]
    fn eq_branches_on_value() {
        let source = r#"{{#eq kind "words"}}W{{else}}{{#eq kind "sentences"}}S{{else}}P{{/eq}}{{/eq}}"#;
        assert_eq!(text(source, json!({"kind": "words"})), "W");
        assert_eq!(text(source, json!({"kind": "sentences"})), "S");
        assert_eq!(text(source, json!({"kind": "paragraphs"})), "P");
    }

    #[test]
    fn each_iterates_with_this_and_index() {
        let source = "{{#each rows}}{{@index}}:{{this.name}};{{/each}}{{#each tags}}[{{this}}]{{/each}}";
        assert_eq!(
            text(
                source,
                json!({"rows": [{"name": "a"}, {"name": "b"}], "tags": ["x", "y"]})
            ),
            "0:a;1:b;[x][y]"
        );
    }

    #[test]
    fn each_over_media_list() {
        let request = render(
            "Compare:{{#each images}}{{media url=this}}{{/each}}",
            json!({"images": [PNG, PNG]}),
        )
        .unwrap();
        assert_eq!(request.len(), 3);
        assert_eq!(request.media().count(), 2);
    }

    #[test]
    fn each_over_absent_is_empty_and_scalar_is_error() {
        assert_eq!(text("a{{#each xs}}{{this}}{{/each}}b", json!({})), "ab");
        assert_eq!(
            render("{{#each xs}}{{this}}{{/each}}", json!({"xs": "no"})),
            Err(TemplateError::NotAList("xs".into()))
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            Template::parse("hello {{name"),
            Err(TemplateError::Unterminated { offset: 6 })
        );
        assert_eq!(
            Template::parse("{{#unless x}}{{/unless}}"),
            Err(TemplateError::UnknownHelper("unless".into()))
        );
        assert_eq!(
            Template::parse("{{#if x}}{{/each}}"),
            Err(TemplateError::MismatchedClose {
                expected: "if".into(),
                found: "each".into()
            })
        );
        assert_eq!(
            Template::parse("{{#if x}}open"),
            Err(TemplateError::UnclosedBlock("if".into()))
        );
        assert_eq!(Template::parse("a{{else}}b"), Err(TemplateError::StrayElse));
        assert_eq!(
            Template::parse("{{#each xs}}{{else}}{{/each}}"),
            Err(TemplateError::StrayElse)
        );
        assert_eq!(
            Template::parse("{{/if}}"),
            Err(TemplateError::UnexpectedClose("if".into()))
        );
        assert_eq!(
            Template::parse("{{this}}"),
            Err(TemplateError::ThisOutsideEach("this".into()))
        );
        assert!(matches!(
            Template::parse("{{a b c}}"),
            Err(TemplateError::InvalidTag(_))
        ));
    }

    #[test]
    fn non_object_input_is_rejected() {
        assert_eq!(
            render("x", json!([1, 2])),
            Err(TemplateError::InvalidInput("an array".into()))
        );
    }

    #[test]
    fn source_is_kept() {
        let template = Template::parse("Hi {{name}}").unwrap();
        assert_eq!(template.source(), "Hi {{name}}");
    }
}
