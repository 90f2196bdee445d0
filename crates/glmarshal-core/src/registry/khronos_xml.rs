use roxmltree::{Document, Node};

use crate::ctype::CType;
use crate::diagnostics::{Diagnostic, DiagnosticCode};

use super::{Command, CommandParam, ExtensionGroup, FeatureGroup, Registry};

pub fn parse_registry(text: &str) -> Result<Registry, Diagnostic> {
    let doc = Document::parse(text).map_err(|err| {
        Diagnostic::error(
            DiagnosticCode::Glm0001RegistryParse,
            format!("parse registry XML: {err}"),
        )
    })?;
    let root = doc.root_element();
    if !root.has_tag_name("registry") {
        return Err(Diagnostic::error(
            DiagnosticCode::Glm0001RegistryParse,
            format!(
                "expected <registry> root element, found <{}>",
                root.tag_name().name()
            ),
        ));
    }

    let mut commands: Vec<Command> = Vec::new();
    let mut features: Vec<FeatureGroup> = Vec::new();
    let mut extensions: Vec<ExtensionGroup> = Vec::new();

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "commands" => {
                for cmd in elements(child, "command") {
                    commands.push(parse_command(cmd)?);
                }
            }
            "feature" => features.push(FeatureGroup {
                name: required_attr(child, "name")?.to_string(),
                api: child.attribute("api").map(str::to_string),
                number: child.attribute("number").map(str::to_string),
                commands: required_commands(child)?,
            }),
            "extensions" => {
                for ext in elements(child, "extension") {
                    extensions.push(ExtensionGroup {
                        name: required_attr(ext, "name")?.to_string(),
                        supported: ext.attribute("supported").map(str::to_string),
                        commands: required_commands(ext)?,
                    });
                }
            }
            _ => {}
        }
    }

    Registry::from_parts(commands, features, extensions)
}

fn parse_command(node: Node<'_, '_>) -> Result<Command, Diagnostic> {
    let Some(proto) = elements(node, "proto").next() else {
        return Err(parse_err(node, "<command> without <proto>"));
    };
    let name = element_text(proto, "name").ok_or_else(|| parse_err(proto, "<proto> without <name>"))?;

    let mut params: Vec<CommandParam> = Vec::new();
    for p in elements(node, "param") {
        let pname = element_text(p, "name")
            .ok_or_else(|| parse_err(p, &format!("<param> of {name} without <name>")))?;
        params.push(CommandParam {
            ty: CType::parse(&type_text(p)),
            name: pname,
            len: p.attribute("len").map(str::to_string),
            group: p.attribute("group").map(str::to_string),
        });
    }

    let alias = elements(node, "alias")
        .next()
        .map(|a| required_attr(a, "name").map(str::to_string))
        .transpose()?;

    let ret = type_text(proto);
    Ok(Command {
        name,
        return_type: if ret.trim().is_empty() {
            CType::void()
        } else {
            CType::parse(&ret)
        },
        params,
        alias,
    })
}

/// All text that precedes the `<name>` child, with `<ptype>` contents inlined:
/// `const <ptype>GLuint</ptype> *<name>ids</name>` reads as `const GLuint *`.
fn type_text(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    for child in node.children() {
        if child.is_element() && child.has_tag_name("name") {
            break;
        }
        if child.is_text() {
            out.push_str(child.text().unwrap_or(""));
        } else if child.is_element() {
            for t in child.descendants().filter(Node::is_text) {
                out.push_str(t.text().unwrap_or(""));
            }
        }
    }
    out
}

fn required_commands(group: Node<'_, '_>) -> Result<Vec<String>, Diagnostic> {
    let mut out = Vec::new();
    for req in elements(group, "require") {
        for cmd in elements(req, "command") {
            out.push(required_attr(cmd, "name")?.to_string());
        }
    }
    Ok(out)
}

fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.has_tag_name(tag))
}

fn element_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    elements(node, tag)
        .next()
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
}

fn required_attr<'a>(node: Node<'a, '_>, attr: &str) -> Result<&'a str, Diagnostic> {
    node.attribute(attr).ok_or_else(|| {
        parse_err(
            node,
            &format!("<{}> is missing attribute {attr:?}", node.tag_name().name()),
        )
    })
}

fn parse_err(node: Node<'_, '_>, msg: &str) -> Diagnostic {
    let pos = node.document().text_pos_at(node.range().start);
    Diagnostic::error(
        DiagnosticCode::Glm0001RegistryParse,
        format!("{msg} at line {}", pos.row),
    )
}
