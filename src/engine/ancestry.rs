//! Upline resolution from materialized paths
//!
//! The chain for commission cascades is the TREE upline (parent
//! chain), decoded from the member's own path without recursive
//! queries. Level 1 is the direct tree parent.

use diesel::prelude::*;

use crate::db::members;
use crate::db::models::Member;
use crate::error::MatrixError;

/// One upline entry: the ancestor row plus its distance from the base
/// member (1 = direct tree parent)
#[derive(Debug, Clone)]
pub struct Ancestor {
    pub level: i32,
    pub member: Member,
}

/// Decode a materialized path into ancestor ids, nearest first,
/// excluding the member itself. `/a/b/c/` for member c yields
/// `["b", "a"]`.
pub fn ancestor_ids(path: &str, member_id: &str, max_levels: usize) -> Vec<String> {
    let mut ids: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if ids.last() == Some(&member_id) {
        ids.pop();
    }
    ids.iter()
        .rev()
        .take(max_levels)
        .map(|s| s.to_string())
        .collect()
}

/// Load up to `max_levels` tree ancestors of a member, nearest first.
///
/// Unplaced members have no upline. Path segments with no surviving
/// member row are skipped without shifting the levels of the rest.
pub fn get_ancestors(
    conn: &mut SqliteConnection,
    member: &Member,
    max_levels: usize,
) -> Result<Vec<Ancestor>, MatrixError> {
    let Some(path) = &member.path else {
        return Ok(Vec::new());
    };

    let mut ancestors = Vec::new();
    for (idx, ancestor_id) in ancestor_ids(path, &member.id, max_levels).iter().enumerate() {
        if let Some(row) = members::get_member(conn, ancestor_id)? {
            ancestors.push(Ancestor {
                level: (idx + 1) as i32,
                member: row,
            });
        }
    }
    Ok(ancestors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::members::{create_member, CreateMemberInput};
    use crate::db::schema_sql;
    use crate::engine::placement::place_member;

    fn setup() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        schema_sql::init_schema(&mut conn).unwrap();
        conn
    }

    fn add(conn: &mut SqliteConnection, id: &str) {
        create_member(
            conn,
            &CreateMemberInput {
                id: id.into(),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn ids_decode_nearest_first() {
        assert_eq!(
            ancestor_ids("/a/b/c/", "c", 8),
            vec!["b".to_string(), "a".to_string()]
        );
        assert!(ancestor_ids("/a/", "a", 8).is_empty());
        // Truncation keeps the nearest levels
        assert_eq!(
            ancestor_ids("/a/b/c/d/", "d", 2),
            vec!["c".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn chain_follows_tree_parents() {
        let mut conn = setup();
        let config = crate::config::Config::default();
        for id in ["a", "b", "c"] {
            add(&mut conn, id);
        }
        place_member(&mut conn, &config, "a", None).unwrap();
        place_member(&mut conn, &config, "b", Some("a")).unwrap();
        place_member(&mut conn, &config, "c", Some("b")).unwrap();

        let c = members::require_member(&mut conn, "c").unwrap();
        let chain = get_ancestors(&mut conn, &c, 8).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].level, 1);
        assert_eq!(chain[0].member.id, "b");
        assert_eq!(chain[1].level, 2);
        assert_eq!(chain[1].member.id, "a");
    }

    #[test]
    fn unplaced_member_has_no_upline() {
        let mut conn = setup();
        add(&mut conn, "lonely");
        let m = members::require_member(&mut conn, "lonely").unwrap();
        assert!(get_ancestors(&mut conn, &m, 8).unwrap().is_empty());
    }
}
