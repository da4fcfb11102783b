use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::models::TEAM_OF_SUFFIX;
use crate::roster::ParticipantKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousIdentity {
    pub name: String,
    pub email: String,
    pub team: String,
}

pub fn anonymous_name(kind: ParticipantKind, real_name: &str) -> String {
    let digest = Sha256::digest(real_name.as_bytes());
    let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("Anonymous {} {}", kind.singular(), short)
}

pub fn anonymous_email(kind: ParticipantKind, real_name: &str) -> String {
    let name = anonymous_name(kind, real_name);
    format!("{name}@@{name}.com")
}

pub fn is_anonymous_name(name: &str) -> bool {
    name.starts_with("Anonymous ")
}

#[derive(Debug, Default)]
pub struct Anonymizer {
    memo: HashMap<(ParticipantKind, String), AnonymousIdentity>,
}

impl Anonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&mut self, kind: ParticipantKind, real_name: &str) -> &AnonymousIdentity {
        self.memo
            .entry((kind, real_name.to_string()))
            .or_insert_with(|| {
                let name = anonymous_name(kind, real_name);
                AnonymousIdentity {
                    email: anonymous_email(kind, real_name),
                    team: format!("{name}{TEAM_OF_SUFFIX}"),
                    name,
                }
            })
    }
}
