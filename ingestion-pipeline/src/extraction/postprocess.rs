//! Deterministic post-processing of extraction output: author heuristics,
//! key resolution, and evidence-to-chunk linking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resolver::resolve_entity_key;

use super::{ExtractedEntity, ExtractionResult};

/// Freemail domains that never become Company entities.
pub const PUBLIC_MAIL_DOMAINS: [&str; 16] = [
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "gmx.de",
    "gmx.net",
    "web.de",
    "icloud.com",
    "me.com",
    "t-online.de",
    "live.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "mail.com",
];

/// An extracted entity with its resolved key and linked evidence chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEntity {
    pub key: String,
    pub entity_type: String,
    pub name: String,
    pub email: Option<String>,
    pub domain: Option<String>,
    pub confidence: f32,
    pub evidence: String,
    pub evidence_chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedRelation {
    pub from_key: String,
    pub to_key: String,
    pub relation_type: String,
    pub evidence: String,
    pub evidence_chunk_ids: Vec<String>,
}

/// Payload handed from the extraction stage to the graph upsert stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertGraphPayload {
    pub document_id: String,
    pub connection_id: String,
    pub entities: Vec<ResolvedEntity>,
    pub relations: Vec<ResolvedRelation>,
    pub entity_keys: HashMap<String, String>,
}

/// Add Person/Company entities derived from the author headers unless a
/// case-insensitive name match already exists. The company is skipped for
/// public mail providers.
pub fn augment_with_author(
    result: &mut ExtractionResult,
    author_name: Option<&str>,
    author_email: Option<&str>,
) {
    let Some(email) = author_email.map(str::trim).filter(|e| e.contains('@')) else {
        return;
    };
    let Some((local_part, domain)) = email.split_once('@') else {
        return;
    };
    let domain = domain.to_lowercase();

    let existing_names: Vec<String> = result
        .entities
        .iter()
        .map(|e| e.name.to_lowercase())
        .collect();

    let person_name = author_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(local_part)
        .to_string();
    if !existing_names.contains(&person_name.to_lowercase()) {
        result.entities.push(ExtractedEntity {
            entity_type: "Person".to_string(),
            name: person_name,
            email: email.to_string(),
            domain: String::new(),
            evidence: String::new(),
            confidence: Some(1.0),
        });
    }

    if !PUBLIC_MAIL_DOMAINS.contains(&domain.as_str()) {
        let company_name = capitalize(domain.split('.').next().unwrap_or(&domain));
        if !result
            .entities
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(&company_name))
        {
            result.entities.push(ExtractedEntity {
                entity_type: "Company".to_string(),
                name: company_name,
                email: String::new(),
                domain,
                evidence: String::new(),
                confidence: Some(1.0),
            });
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Resolve keys, link evidence to chunks and drop relations whose endpoints
/// did not resolve. Chunk matching is a case-insensitive substring test
/// (Rust `to_lowercase`, Unicode simple case folding), falling back from
/// evidence spans to entity/endpoint names; matched chunk ids keep their
/// first-match order.
pub fn resolve_extraction(
    result: &ExtractionResult,
    chunks: &[(String, String)],
) -> (Vec<ResolvedEntity>, Vec<ResolvedRelation>, HashMap<String, String>) {
    let mut entity_keys: HashMap<String, String> = HashMap::new();
    let mut entities = Vec::with_capacity(result.entities.len());

    for entity in &result.entities {
        if entity.name.trim().is_empty() {
            continue;
        }

        let key = resolve_entity_key(
            &entity.entity_type,
            &entity.name,
            Some(&entity.email),
            Some(&entity.domain),
        );
        entity_keys.insert(entity.name.clone(), key.clone());

        let evidence_chunk_ids = link_evidence(chunks, &[&entity.evidence, &entity.name]);

        entities.push(ResolvedEntity {
            key,
            entity_type: entity.entity_type.clone(),
            name: entity.name.clone(),
            email: non_empty(&entity.email),
            domain: non_empty(&entity.domain),
            confidence: entity.confidence.unwrap_or(1.0),
            evidence: entity.evidence.clone(),
            evidence_chunk_ids,
        });
    }

    let mut relations = Vec::new();
    for relation in &result.relations {
        let (Some(from_key), Some(to_key)) = (
            entity_keys.get(&relation.from_name),
            entity_keys.get(&relation.to_name),
        ) else {
            continue;
        };

        let evidence_chunk_ids = link_evidence(
            chunks,
            &[&relation.evidence, &relation.from_name, &relation.to_name],
        );

        relations.push(ResolvedRelation {
            from_key: from_key.clone(),
            to_key: to_key.clone(),
            relation_type: relation.relation_type.clone(),
            evidence: relation.evidence.clone(),
            evidence_chunk_ids,
        });
    }

    (entities, relations, entity_keys)
}

/// First needle that matches any chunk wins; its matches are returned in
/// chunk order, deduplicated.
fn link_evidence(chunks: &[(String, String)], needles: &[&str]) -> Vec<String> {
    for needle in needles {
        let needle = needle.trim();
        if needle.is_empty() {
            continue;
        }
        let folded = needle.to_lowercase();

        let mut seen = std::collections::HashSet::new();
        let mut matches = Vec::new();
        for (chunk_id, text) in chunks {
            if text.to_lowercase().contains(&folded) && seen.insert(chunk_id.clone()) {
                matches.push(chunk_id.clone());
            }
        }
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractedRelation;

    fn entity(entity_type: &str, name: &str, email: &str, domain: &str, evidence: &str) -> ExtractedEntity {
        ExtractedEntity {
            entity_type: entity_type.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            domain: domain.to_string(),
            evidence: evidence.to_string(),
            confidence: None,
        }
    }

    #[test]
    fn author_augmentation_adds_person_and_company() {
        let mut result = ExtractionResult::default();
        augment_with_author(&mut result, Some("Alice"), Some("alice@acme.com"));

        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].entity_type, "Person");
        assert_eq!(result.entities[0].name, "Alice");
        assert_eq!(result.entities[0].email, "alice@acme.com");
        assert_eq!(result.entities[1].entity_type, "Company");
        assert_eq!(result.entities[1].name, "Acme");
        assert_eq!(result.entities[1].domain, "acme.com");
    }

    #[test]
    fn author_augmentation_skips_public_mail_domains() {
        let mut result = ExtractionResult::default();
        augment_with_author(&mut result, Some("Bob"), Some("bob@gmail.com"));

        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].entity_type, "Person");
    }

    #[test]
    fn author_augmentation_uses_local_part_without_name() {
        let mut result = ExtractionResult::default();
        augment_with_author(&mut result, None, Some("carol@initech.io"));

        assert_eq!(result.entities[0].name, "carol");
        assert_eq!(result.entities[1].name, "Initech");
    }

    #[test]
    fn author_augmentation_respects_existing_names() {
        let mut result = ExtractionResult {
            entities: vec![entity("Person", "Alice", "", "", "")],
            relations: Vec::new(),
        };
        augment_with_author(&mut result, Some("alice"), Some("alice@acme.com"));

        // Person deduplicated by case-insensitive name; Company still added
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[1].name, "Acme");
    }

    #[test]
    fn resolve_extraction_assigns_keys_and_links_evidence() {
        let result = ExtractionResult {
            entities: vec![
                entity("Person", "Alice", "alice@acme.com", "", "Alice works at Acme"),
                entity("Company", "Acme", "", "acme.com", ""),
            ],
            relations: vec![ExtractedRelation {
                from_name: "Alice".to_string(),
                to_name: "Acme".to_string(),
                relation_type: "works at".to_string(),
                evidence: "Alice works at Acme".to_string(),
                qualifiers: None,
            }],
        };
        let chunks = vec![
            ("c1".to_string(), "Alice works at Acme. Contact her.".to_string()),
            ("c2".to_string(), "Unrelated paragraph.".to_string()),
        ];

        let (entities, relations, keys) = resolve_extraction(&result, &chunks);

        assert_eq!(keys.get("Alice").map(String::as_str), Some("person:email:alice@acme.com"));
        assert_eq!(keys.get("Acme").map(String::as_str), Some("company:domain:acme.com"));

        assert_eq!(entities[0].evidence_chunk_ids, vec!["c1".to_string()]);
        // No evidence span for Acme, falls back to the name match
        assert_eq!(entities[1].evidence_chunk_ids, vec!["c1".to_string()]);

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].from_key, "person:email:alice@acme.com");
        assert_eq!(relations[0].to_key, "company:domain:acme.com");
        assert_eq!(relations[0].evidence_chunk_ids, vec!["c1".to_string()]);
    }

    #[test]
    fn relations_with_unresolved_endpoints_are_dropped() {
        let result = ExtractionResult {
            entities: vec![entity("Person", "Alice", "alice@acme.com", "", "")],
            relations: vec![ExtractedRelation {
                from_name: "Alice".to_string(),
                to_name: "Ghost Corp".to_string(),
                relation_type: "WORKS_AT".to_string(),
                evidence: String::new(),
                qualifiers: None,
            }],
        };

        let (_, relations, _) = resolve_extraction(&result, &[]);
        assert!(relations.is_empty());
    }

    #[test]
    fn evidence_matching_is_case_insensitive() {
        let result = ExtractionResult {
            entities: vec![entity("Topic", "Quarterly Report", "", "", "THE QUARTERLY REPORT")],
            relations: Vec::new(),
        };
        let chunks = vec![("c1".to_string(), "We discussed the quarterly report.".to_string())];

        let (entities, _, _) = resolve_extraction(&result, &chunks);
        assert_eq!(entities[0].evidence_chunk_ids, vec!["c1".to_string()]);
    }

    #[test]
    fn nameless_entities_are_skipped() {
        let result = ExtractionResult {
            entities: vec![entity("Topic", "  ", "", "", "")],
            relations: Vec::new(),
        };
        let (entities, _, keys) = resolve_extraction(&result, &[]);
        assert!(entities.is_empty());
        assert!(keys.is_empty());
    }
}
