//! Links an event pattern to a playbook (spec §3).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connects an event type and optional predicate to a playbook, with a
/// priority used to order matching bindings (spec §4.2 step 2).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlaybookBinding {
    pub id: i64,
    pub organization_id: i64,
    pub event_type: String,
    pub playbook_id: i64,
    pub predicate: Option<String>,
    pub priority: i32,
    pub is_active: bool,
}

impl PlaybookBinding {
    /// Ordering used by `listActiveBindings`: priority descending, id
    /// ascending on ties (spec §4.2 step 2).
    pub fn ordering_key(&self) -> (i32, i64) {
        (-self.priority, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_priority_desc_then_id_asc() {
        let mut bindings = vec![
            PlaybookBinding {
                id: 2,
                organization_id: 1,
                event_type: "alert.created".into(),
                playbook_id: 1,
                predicate: None,
                priority: 5,
                is_active: true,
            },
            PlaybookBinding {
                id: 1,
                organization_id: 1,
                event_type: "alert.created".into(),
                playbook_id: 2,
                predicate: None,
                priority: 10,
                is_active: true,
            },
            PlaybookBinding {
                id: 3,
                organization_id: 1,
                event_type: "alert.created".into(),
                playbook_id: 3,
                predicate: None,
                priority: 10,
                is_active: true,
            },
        ];
        bindings.sort_by_key(PlaybookBinding::ordering_key);
        let ids: Vec<i64> = bindings.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }
}
