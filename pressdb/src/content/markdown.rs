use crate::error::{PressDbError, Result};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use serde::Serialize;
use serde_json::{Map, Value};

/// One node of the structured body representation. The presentation layer
/// consumes this tree instead of raw markdown text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarkdownNode {
    Root {
        children: Vec<MarkdownNode>,
    },
    Element {
        tag: String,
        #[serde(skip_serializing_if = "Map::is_empty")]
        props: Map<String, Value>,
        children: Vec<MarkdownNode>,
    },
    Text {
        value: String,
    },
}

impl MarkdownNode {
    fn element(tag: &str) -> MarkdownNode {
        MarkdownNode::Element {
            tag: tag.to_string(),
            props: Map::new(),
            children: Vec::new(),
        }
    }

    fn text(value: impl Into<String>) -> MarkdownNode {
        MarkdownNode::Text {
            value: value.into(),
        }
    }
}

/// A rendered markdown body plus the defaults derived from it.
#[derive(Debug, Clone)]
pub struct MarkdownBody {
    pub root: MarkdownNode,
    /// Text of the first top-level h1, if any.
    pub title: Option<String>,
    /// Text of the first top-level paragraph, if any.
    pub description: Option<String>,
}

/// Split YAML front matter from body content. Returns the decoded front
/// matter (when present) and the remaining body text. A document that opens
/// a front-matter fence but never closes it is malformed.
pub fn split_front_matter(text: &str) -> Result<(Option<serde_yaml::Value>, &str)> {
    let Some(after_fence) = text.strip_prefix("---") else {
        return Ok((None, text));
    };
    let Some(rest) = after_fence
        .strip_prefix("\r\n")
        .or_else(|| after_fence.strip_prefix('\n'))
    else {
        return Ok((None, text));
    };

    let mut search_from = 0;
    loop {
        let Some(found) = rest[search_from..].find("\n---") else {
            return Err(PressDbError::Validation(
                "Unterminated front matter".to_string(),
            ));
        };
        let at = search_from + found;
        let after = &rest[at + 4..];
        if after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n") {
            let front = &rest[..at];
            let body = after.strip_prefix('\n').unwrap_or(after);
            let value = if front.trim().is_empty() {
                None
            } else {
                Some(serde_yaml::from_str(front)?)
            };
            return Ok((value, body));
        }
        search_from = at + 1;
    }
}

struct Frame {
    tag: String,
    props: Map<String, Value>,
    children: Vec<MarkdownNode>,
}

/// Render a markdown body into the block/inline node tree, extracting the
/// first-heading and first-paragraph defaults along the way.
pub fn render_markdown(text: &str) -> MarkdownBody {
    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(text, options);

    let mut stack = vec![Frame {
        tag: "root".to_string(),
        props: Map::new(),
        children: Vec::new(),
    }];
    let mut title = None;
    let mut description = None;

    for event in parser {
        match event {
            Event::Start(tag) => {
                let (tag, props) = element_for(&tag);
                stack.push(Frame {
                    tag,
                    props,
                    children: Vec::new(),
                });
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    if let Some(frame) = stack.pop() {
                        let top_level = stack.len() == 1;
                        if title.is_none() && frame.tag == "h1" {
                            title = Some(collect_text(&frame.children));
                        }
                        if description.is_none() && top_level && frame.tag == "p" {
                            description = Some(collect_text(&frame.children));
                        }
                        let node = MarkdownNode::Element {
                            tag: frame.tag,
                            props: frame.props,
                            children: frame.children,
                        };
                        push_node(&mut stack, node);
                    }
                }
            }
            Event::Text(text) => {
                push_node(&mut stack, MarkdownNode::text(text.to_string()));
            }
            Event::Code(code) => {
                let mut element = MarkdownNode::element("code");
                if let MarkdownNode::Element { children, .. } = &mut element {
                    children.push(MarkdownNode::text(code.to_string()));
                }
                push_node(&mut stack, element);
            }
            Event::SoftBreak => push_node(&mut stack, MarkdownNode::text(" ")),
            Event::HardBreak => push_node(&mut stack, MarkdownNode::element("br")),
            Event::Rule => push_node(&mut stack, MarkdownNode::element("hr")),
            Event::TaskListMarker(checked) => {
                let mut props = Map::new();
                props.insert("type".to_string(), Value::String("checkbox".to_string()));
                props.insert("checked".to_string(), Value::Bool(checked));
                push_node(
                    &mut stack,
                    MarkdownNode::Element {
                        tag: "input".to_string(),
                        props,
                        children: Vec::new(),
                    },
                );
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                push_node(&mut stack, MarkdownNode::text(html.to_string()));
            }
            _ => {}
        }
    }

    // Unwind for ill-formed event streams.
    while stack.len() > 1 {
        if let Some(frame) = stack.pop() {
            let node = MarkdownNode::Element {
                tag: frame.tag,
                props: frame.props,
                children: frame.children,
            };
            push_node(&mut stack, node);
        }
    }

    let children = stack.pop().map(|frame| frame.children).unwrap_or_default();
    MarkdownBody {
        root: MarkdownNode::Root { children },
        title,
        description,
    }
}

fn push_node(stack: &mut [Frame], node: MarkdownNode) {
    if let Some(frame) = stack.last_mut() {
        frame.children.push(node);
    }
}

fn element_for(tag: &Tag) -> (String, Map<String, Value>) {
    let mut props = Map::new();
    let name = match tag {
        Tag::Paragraph => "p",
        Tag::Heading { level, .. } => match level {
            HeadingLevel::H1 => "h1",
            HeadingLevel::H2 => "h2",
            HeadingLevel::H3 => "h3",
            HeadingLevel::H4 => "h4",
            HeadingLevel::H5 => "h5",
            HeadingLevel::H6 => "h6",
        },
        Tag::BlockQuote(_) => "blockquote",
        Tag::CodeBlock(kind) => {
            if let CodeBlockKind::Fenced(language) = kind {
                if !language.is_empty() {
                    props.insert(
                        "language".to_string(),
                        Value::String(language.to_string()),
                    );
                }
            }
            "pre"
        }
        Tag::List(Some(start)) => {
            if *start != 1 {
                props.insert("start".to_string(), Value::from(*start));
            }
            "ol"
        }
        Tag::List(None) => "ul",
        Tag::Item => "li",
        Tag::Table(_) => "table",
        Tag::TableHead => "thead",
        Tag::TableRow => "tr",
        Tag::TableCell => "td",
        Tag::Emphasis => "em",
        Tag::Strong => "strong",
        Tag::Strikethrough => "s",
        Tag::Link {
            dest_url, title, ..
        } => {
            props.insert("href".to_string(), Value::String(dest_url.to_string()));
            if !title.is_empty() {
                props.insert("title".to_string(), Value::String(title.to_string()));
            }
            "a"
        }
        Tag::Image {
            dest_url, title, ..
        } => {
            props.insert("src".to_string(), Value::String(dest_url.to_string()));
            if !title.is_empty() {
                props.insert("title".to_string(), Value::String(title.to_string()));
            }
            "img"
        }
        _ => "div",
    };
    (name.to_string(), props)
}

/// Concatenate the text content of a node list.
pub fn collect_text(nodes: &[MarkdownNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            MarkdownNode::Text { value } => out.push_str(value),
            MarkdownNode::Element { children, .. } | MarkdownNode::Root { children } => {
                out.push_str(&collect_text(children));
            }
        }
    }
    out
}
