//! Contact points of the DCAT-AP_IT dataset graph.
//!
//! The generic serializer emits one contact node built from the raw
//! `contact_point` attribute. Packages harvested here store that attribute as
//! a JSON list of contact objects, so the dataset's contact nodes are
//! rebuilt from the list.

use oxrdf::vocab::rdf;
use oxrdf::{BlankNode, Graph, Literal, NamedNode, NamedNodeRef, NamedOrBlankNode, Term, Triple, TripleRef};
use serde_json::Value;
use tracing::{debug, warn};

use crate::decode::decode;

/// Value written for contact fields the package leaves unset.
pub const PLACEHOLDER: &str = "N/A";

const CONTACT_POINT: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#contactPoint");
const DCATAPIT_ORGANIZATION: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://dati.gov.it/onto/dcatapit#Organization");
const VCARD_KIND: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#Kind");
const VCARD_ORGANIZATION: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#Organization");
const VCARD_FN: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#fn");
const VCARD_HAS_EMAIL: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#hasEmail");
const VCARD_HAS_URL: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#hasURL");
const DCT_IDENTIFIER: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/identifier");

/// One entry of the `contact_point` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPoint {
    pub name: String,
    pub identifier: String,
    pub email: String,
    pub url: String,
}

impl ContactPoint {
    fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(PLACEHOLDER)
                .to_string()
        };
        Self {
            name: field("contact_point_name"),
            identifier: field("contact_point_identifier"),
            email: field("contact_point_email"),
            url: field("contact_point_url"),
        }
    }
}

/// Parses the `contact_point` attribute; `None` when it is not a JSON list.
pub fn parse_contact_points(text: &str) -> Option<Vec<ContactPoint>> {
    match decode(text) {
        Ok(Value::Array(items)) => Some(items.iter().map(ContactPoint::from_value).collect()),
        Ok(other) => {
            warn!(contact_point = %other, "contact_point is not a list");
            None
        }
        Err(e) => {
            warn!(error = %e, "Could not decode contact_point");
            None
        }
    }
}

/// Replaces the contact nodes of `dataset` with one node per contact entry.
///
/// Returns how many contact nodes were written. When the attribute is absent
/// or cannot be decoded the graph is left untouched.
pub fn patch_contact_points(
    graph: &mut Graph,
    dataset: &NamedOrBlankNode,
    contact_point: Option<&str>,
) -> usize {
    let Some(contacts) = contact_point.and_then(parse_contact_points) else {
        return 0;
    };

    remove_contact_nodes(graph, dataset);

    for contact in &contacts {
        let node = BlankNode::default();
        graph.insert(&Triple::new(dataset.clone(), CONTACT_POINT, node.clone()));

        let mut add = |predicate: NamedNodeRef<'_>, object: Term| {
            graph.insert(&Triple::new(node.clone(), predicate, object));
        };
        add(rdf::TYPE, NamedNode::from(DCATAPIT_ORGANIZATION).into());
        add(rdf::TYPE, NamedNode::from(VCARD_KIND).into());
        add(rdf::TYPE, NamedNode::from(VCARD_ORGANIZATION).into());
        add(VCARD_FN, Literal::new_simple_literal(&contact.name).into());
        add(DCT_IDENTIFIER, Literal::new_simple_literal(&contact.identifier).into());
        add(VCARD_HAS_EMAIL, email_term(&contact.email));
        add(VCARD_HAS_URL, iri_or_literal(&contact.url));
    }

    debug!(count = contacts.len(), "Contact points written");
    contacts.len()
}

fn email_term(email: &str) -> Term {
    if email == PLACEHOLDER {
        return Literal::new_simple_literal(email).into();
    }
    iri_or_literal(&format!("mailto:{}", email))
}

fn iri_or_literal(value: &str) -> Term {
    match NamedNode::new(value) {
        Ok(iri) => iri.into(),
        Err(_) => Literal::new_simple_literal(value).into(),
    }
}

fn as_subject(term: &Term) -> Option<NamedOrBlankNode> {
    match term {
        Term::NamedNode(node) => Some(node.clone().into()),
        Term::BlankNode(node) => Some(node.clone().into()),
        _ => None,
    }
}

/// Contact nodes currently linked from `dataset`.
pub fn contact_nodes(graph: &Graph, dataset: &NamedOrBlankNode) -> Vec<NamedOrBlankNode> {
    graph
        .iter()
        .map(TripleRef::into_owned)
        .filter(|t| &t.subject == dataset && t.predicate.as_ref() == CONTACT_POINT)
        .filter_map(|t| as_subject(&t.object))
        .collect()
}

fn remove_contact_nodes(graph: &mut Graph, dataset: &NamedOrBlankNode) {
    let nodes = contact_nodes(graph, dataset);
    let stale: Vec<Triple> = graph
        .iter()
        .map(TripleRef::into_owned)
        .filter(|t| {
            nodes.contains(&t.subject)
                || (&t.subject == dataset && t.predicate.as_ref() == CONTACT_POINT)
        })
        .collect();
    for triple in &stale {
        graph.remove(triple);
    }
}
