//! `server.xml` DOM patching (§4.3).
//!
//! The rendered template (after [`lucli_template::apply_conditionals`] has
//! decided which `Connector` blocks are even present) still needs exact
//! port numbers, a keystore path, and the instance's `jvmRoute` written in.
//! Spec calls for XPath-style attribute writes rather than textual
//! substitution, so values never get mangled by a Connector element that
//! happens to share a numeral with another attribute. We walk the document
//! as a token stream with `quick_xml` and rewrite attributes on elements
//! that match a selector, leaving everything else byte-for-byte.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io::Cursor;

use lucli_types::{LucliError, ServerConfig};

/// Default `server.xml` shipped with LuCLI, used when a distribution
/// doesn't carry its own (e.g. the external/container providers, or an
/// embedded distribution fetch that hasn't happened yet in offline tests).
pub const DEFAULT_SERVER_XML_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Server port="8005" shutdown="SHUTDOWN">
  <Service name="Catalina">
    <Connector port="8080" protocol="HTTP/1.1" connectionTimeout="20000" />
<!-- IF_AJP_ENABLED -->
    <Connector port="8009" protocol="AJP/1.3" />
<!-- END_IF_AJP_ENABLED -->
<!-- IF_HTTPS_ENABLED -->
    <Connector port="8443" protocol="org.apache.coyote.http11.Http11NioProtocol" scheme="https" secure="true" SSLEnabled="true" />
<!-- END_IF_HTTPS_ENABLED -->
    <Engine name="Catalina" defaultHost="localhost" jvmRoute="">
      <Host name="localhost" appBase="webapps" unpackWARs="true" autoDeploy="true" />
    </Engine>
  </Service>
</Server>
"#;

/// A single-step XPath-like selector: an element name, optionally
/// disambiguated by an existing attribute's value (e.g. `Connector`
/// matched by `protocol="AJP/1.3"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSelector {
    pub element: String,
    pub match_attr: Option<(String, String)>,
}

impl ElementSelector {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            match_attr: None,
        }
    }

    pub fn matching(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_attr = Some((attr.into(), value.into()));
        self
    }
}

/// A selector plus the attribute values to write when it matches.
#[derive(Debug, Clone)]
pub struct AttributePatch {
    pub selector: ElementSelector,
    pub set: Vec<(String, String)>,
}

fn element_matches(start: &BytesStart, selector: &ElementSelector) -> bool {
    if start.name().as_ref() != selector.element.as_bytes() {
        return false;
    }
    let Some((attr_name, attr_value)) = &selector.match_attr else {
        return true;
    };
    start.attributes().flatten().any(|a| {
        a.key.as_ref() == attr_name.as_bytes() && a.unescape_value().map(|v| v == *attr_value).unwrap_or(false)
    })
}

fn apply_attrs(start: &mut BytesStart, set: &[(String, String)]) {
    // Rebuild the attribute list preserving existing entries, overwriting
    // any that `set` names and appending the rest.
    let existing: Vec<(String, String)> = start
        .attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                a.unescape_value().unwrap_or_default().into_owned(),
            )
        })
        .collect();
    start.clear_attributes();
    for (key, value) in &existing {
        if set.iter().any(|(k, _)| k == key) {
            continue;
        }
        start.push_attribute((key.as_str(), value.as_str()));
    }
    for (key, value) in set {
        start.push_attribute((key.as_str(), value.as_str()));
    }
}

/// Rewrite every element matching one of `patches` with the attribute
/// values it specifies; unmatched elements and all text/comment content
/// pass through unchanged.
pub fn patch(input: &str, patches: &[AttributePatch]) -> Result<String, LucliError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    loop {
        let event = reader
            .read_event()
            .map_err(|e| LucliError::RuntimeMisconfigured(format!("malformed server.xml: {e}")))?;
        match event {
            Event::Eof => break,
            Event::Start(mut start) => {
                for patch in patches {
                    if element_matches(&start, &patch.selector) {
                        apply_attrs(&mut start, &patch.set);
                    }
                }
                writer
                    .write_event(Event::Start(start))
                    .map_err(|e| LucliError::RuntimeMisconfigured(format!("failed to write server.xml: {e}")))?;
            }
            Event::Empty(mut start) => {
                for patch in patches {
                    if element_matches(&start, &patch.selector) {
                        apply_attrs(&mut start, &patch.set);
                    }
                }
                writer
                    .write_event(Event::Empty(start))
                    .map_err(|e| LucliError::RuntimeMisconfigured(format!("failed to write server.xml: {e}")))?;
            }
            other => {
                writer
                    .write_event(other)
                    .map_err(|e| LucliError::RuntimeMisconfigured(format!("failed to write server.xml: {e}")))?;
            }
        }
    }

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| LucliError::RuntimeMisconfigured(format!("server.xml was not valid UTF-8: {e}")))
}

/// Build the attribute patches implied by a resolved [`ServerConfig`]:
/// HTTP connector port, shutdown port, optional HTTPS connector with
/// keystore, optional AJP connector, and the instance's `jvmRoute` (§4.3).
pub fn patches_for(config: &ServerConfig, instance_name: &str) -> Vec<AttributePatch> {
    let mut patches = vec![
        AttributePatch {
            selector: ElementSelector::new("Server"),
            set: vec![("port".to_string(), config.resolve_shutdown_port().to_string())],
        },
        AttributePatch {
            selector: ElementSelector::new("Connector").matching("protocol", "HTTP/1.1"),
            set: vec![("port".to_string(), config.port.to_string())],
        },
        AttributePatch {
            selector: ElementSelector::new("Engine"),
            set: vec![("jvmRoute".to_string(), instance_name.to_string())],
        },
    ];

    if config.https.enabled {
        let mut set = vec![("scheme".to_string(), "https".to_string()), ("secure".to_string(), "true".to_string())];
        if let Some(port) = config.https.port {
            set.push(("port".to_string(), port.to_string()));
        }
        if let Some(keystore) = &config.https.keystore {
            set.push(("keystoreFile".to_string(), keystore.display().to_string()));
        }
        patches.push(AttributePatch {
            selector: ElementSelector::new("Connector").matching("scheme", "https"),
            set,
        });
    }

    if config.ajp.enabled {
        if let Some(port) = config.ajp.port {
            patches.push(AttributePatch {
                selector: ElementSelector::new("Connector").matching("protocol", "AJP/1.3"),
                set: vec![("port".to_string(), port.to_string())],
            });
        }
    }

    patches
}
