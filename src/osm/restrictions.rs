//! Turn-restriction relations: shape validation and typed representation.
//!
//! Only relations with exactly three members holding `from`/`to`/`via` roles
//! survive intake; everything else is counted and dropped. Member types are
//! preserved so the application pass can select the `way-way-node` shape it
//! understands.

use serde::Serialize;

use super::{MemberType, RelationRecord};
use crate::network::BuildSummary;

/// The restriction vocabulary the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    NoLeftTurn,
    NoRightTurn,
    NoStraightOn,
    /// Parsed but reserved: U-turn bans are not enforced yet.
    NoUTurn,
    OnlyLeftTurn,
    OnlyRightTurn,
    OnlyStraightOn,
}

impl RestrictionKind {
    pub fn from_tag(tag: &str) -> Option<RestrictionKind> {
        match tag {
            "no_left_turn" => Some(RestrictionKind::NoLeftTurn),
            "no_right_turn" => Some(RestrictionKind::NoRightTurn),
            "no_straight_on" => Some(RestrictionKind::NoStraightOn),
            "no_u_turn" => Some(RestrictionKind::NoUTurn),
            "only_left_turn" => Some(RestrictionKind::OnlyLeftTurn),
            "only_right_turn" => Some(RestrictionKind::OnlyRightTurn),
            "only_straight_on" => Some(RestrictionKind::OnlyStraightOn),
            _ => None,
        }
    }

    /// `no_left_turn` / `no_right_turn` / `no_straight_on`.
    pub fn is_prohibition(self) -> bool {
        matches!(
            self,
            RestrictionKind::NoLeftTurn | RestrictionKind::NoRightTurn | RestrictionKind::NoStraightOn
        )
    }

    /// `only_*` family.
    pub fn is_mandate(self) -> bool {
        matches!(
            self,
            RestrictionKind::OnlyLeftTurn
                | RestrictionKind::OnlyRightTurn
                | RestrictionKind::OnlyStraightOn
        )
    }
}

/// A typed member reference: restrictions may point at ways or nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberRef {
    Way(i64),
    Node(i64),
}

impl MemberRef {
    pub fn way_id(self) -> Option<i64> {
        match self {
            MemberRef::Way(id) => Some(id),
            MemberRef::Node(_) => None,
        }
    }

    pub fn node_id(self) -> Option<i64> {
        match self {
            MemberRef::Node(id) => Some(id),
            MemberRef::Way(_) => None,
        }
    }
}

/// A shape-validated turn restriction.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRestriction {
    pub relation_id: i64,
    pub kind: RestrictionKind,
    pub from: MemberRef,
    pub to: MemberRef,
    pub via: MemberRef,
}

/// Validate relation shapes and produce typed restrictions.
pub fn parse_restrictions(
    relations: &[RelationRecord],
    summary: &mut BuildSummary,
) -> Vec<TurnRestriction> {
    let mut out = Vec::new();

    'rel: for relation in relations {
        let Some(tag) = relation.tags.get("restriction") else {
            continue;
        };
        let Some(kind) = RestrictionKind::from_tag(tag) else {
            summary.restrictions_unrecognized += 1;
            continue;
        };
        if relation.members.len() != 3 {
            summary.restrictions_skipped += 1;
            continue;
        }

        let mut from = None;
        let mut to = None;
        let mut via = None;
        for member in &relation.members {
            let reference = match member.member_type {
                MemberType::Way => MemberRef::Way(member.ref_id),
                MemberType::Node => MemberRef::Node(member.ref_id),
                MemberType::Relation => {
                    summary.restrictions_skipped += 1;
                    continue 'rel;
                }
            };
            match member.role.as_str() {
                "from" => from = Some(reference),
                "to" => to = Some(reference),
                "via" => via = Some(reference),
                _ => {
                    summary.restriction_unknown_roles += 1;
                }
            }
        }

        match (from, to, via) {
            (Some(from), Some(to), Some(via)) => out.push(TurnRestriction {
                relation_id: relation.id,
                kind,
                from,
                to,
                via,
            }),
            _ => {
                summary.restrictions_skipped += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::{RelationMember, RelationRecord};
    use std::collections::HashMap;

    fn member(role: &str, member_type: MemberType, ref_id: i64) -> RelationMember {
        RelationMember {
            role: role.to_string(),
            member_type,
            ref_id,
        }
    }

    fn restriction_relation(tag: &str, members: Vec<RelationMember>) -> RelationRecord {
        let mut tags = HashMap::new();
        tags.insert("restriction".to_string(), tag.to_string());
        RelationRecord { id: 10, tags, members }
    }

    #[test]
    fn well_formed_relation_parses() {
        let rel = restriction_relation(
            "no_left_turn",
            vec![
                member("from", MemberType::Way, 1),
                member("to", MemberType::Way, 2),
                member("via", MemberType::Node, 3),
            ],
        );
        let mut summary = BuildSummary::default();
        let parsed = parse_restrictions(&[rel], &mut summary);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, RestrictionKind::NoLeftTurn);
        assert_eq!(parsed[0].from, MemberRef::Way(1));
        assert_eq!(parsed[0].via, MemberRef::Node(3));
        assert_eq!(summary.restrictions_skipped, 0);
    }

    #[test]
    fn wrong_member_count_is_counted_and_dropped() {
        let rel = restriction_relation(
            "no_right_turn",
            vec![
                member("from", MemberType::Way, 1),
                member("to", MemberType::Way, 2),
            ],
        );
        let mut summary = BuildSummary::default();
        let parsed = parse_restrictions(&[rel], &mut summary);
        assert!(parsed.is_empty());
        assert_eq!(summary.restrictions_skipped, 1);
    }

    #[test]
    fn unknown_role_is_counted() {
        let rel = restriction_relation(
            "only_straight_on",
            vec![
                member("from", MemberType::Way, 1),
                member("towards", MemberType::Way, 2),
                member("via", MemberType::Node, 3),
            ],
        );
        let mut summary = BuildSummary::default();
        let parsed = parse_restrictions(&[rel], &mut summary);
        assert!(parsed.is_empty());
        assert_eq!(summary.restriction_unknown_roles, 1);
        assert_eq!(summary.restrictions_skipped, 1);
    }

    #[test]
    fn non_restriction_relations_are_ignored_silently() {
        let rel = RelationRecord {
            id: 4,
            tags: HashMap::new(),
            members: vec![],
        };
        let mut summary = BuildSummary::default();
        assert!(parse_restrictions(&[rel], &mut summary).is_empty());
        assert_eq!(summary.restrictions_skipped, 0);
        assert_eq!(summary.restrictions_unrecognized, 0);
    }
}
