//! Deterministic remediation playbook selection.
//!
//! Rules are evaluated in their literal order and the first rule whose trigger
//! set intersects the failing invariant ids wins. Arrival order of the
//! invariants never matters.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::Invariant;

/// Named remediation procedure the reconciler can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Playbook {
    ReconcileFrontdoorServe,
    RecoverNovncWs,
    RestartBrowserSession,
    /// Catch-all when something fails but no rule matches.
    RestartUiStack,
    /// All invariants pass; remediation must not be invoked.
    Noop,
}

impl Playbook {
    /// Playbook applied when failures match no rule.
    pub const DEFAULT: Playbook = Playbook::RestartUiStack;

    pub fn as_str(self) -> &'static str {
        match self {
            Playbook::ReconcileFrontdoorServe => "reconcile_frontdoor_serve",
            Playbook::RecoverNovncWs => "recover_novnc_ws",
            Playbook::RestartBrowserSession => "restart_browser_session",
            Playbook::RestartUiStack => "restart_ui_stack",
            Playbook::Noop => "noop",
        }
    }
}

impl fmt::Display for Playbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger set and the playbook it selects.
#[derive(Debug, Clone, Copy)]
pub struct PlaybookRule {
    pub triggers: &'static [&'static str],
    pub playbook: Playbook,
}

/// Priority-ordered rules. Order is the tie-break.
pub const RULES: &[PlaybookRule] = &[
    PlaybookRule {
        triggers: &["serve_single_root_targets_frontdoor", "frontdoor_http_200"],
        playbook: Playbook::ReconcileFrontdoorServe,
    },
    PlaybookRule {
        triggers: &["novnc_http_200", "novnc_ws_upgrade", "websockify_listening"],
        playbook: Playbook::RecoverNovncWs,
    },
    PlaybookRule {
        triggers: &["vnc_display_alive", "browser_process_alive"],
        playbook: Playbook::RestartBrowserSession,
    },
];

/// Ids of failing invariants. An id reported more than once fails if any report fails.
pub fn failing_ids(invariants: &[Invariant]) -> BTreeSet<&str> {
    invariants
        .iter()
        .filter(|invariant| !invariant.pass)
        .map(|invariant| invariant.id.as_str())
        .collect()
}

/// Select at most one playbook for the given invariant results.
pub fn select_playbook(invariants: &[Invariant]) -> Playbook {
    let failing = failing_ids(invariants);
    if failing.is_empty() {
        return Playbook::Noop;
    }
    RULES
        .iter()
        .find(|rule| rule.triggers.iter().any(|id| failing.contains(id)))
        .map(|rule| rule.playbook)
        .unwrap_or(Playbook::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(ids: &[&str]) -> Vec<Invariant> {
        ids.iter().map(|id| Invariant::new(*id, false)).collect()
    }

    #[test]
    fn frontdoor_rule_selects_reconcile_frontdoor_serve() {
        for id in ["serve_single_root_targets_frontdoor", "frontdoor_http_200"] {
            assert_eq!(
                select_playbook(&failing(&[id])),
                Playbook::ReconcileFrontdoorServe
            );
        }
    }

    #[test]
    fn novnc_rule_selects_recover_novnc_ws() {
        for id in ["novnc_http_200", "novnc_ws_upgrade", "websockify_listening"] {
            assert_eq!(select_playbook(&failing(&[id])), Playbook::RecoverNovncWs);
        }
    }

    #[test]
    fn browser_rule_selects_restart_browser_session() {
        for id in ["vnc_display_alive", "browser_process_alive"] {
            assert_eq!(
                select_playbook(&failing(&[id])),
                Playbook::RestartBrowserSession
            );
        }
    }

    #[test]
    fn unmatched_failure_selects_default() {
        assert_eq!(
            select_playbook(&failing(&["unrelated_check"])),
            Playbook::RestartUiStack
        );
    }

    #[test]
    fn all_passing_is_noop() {
        let invariants = vec![
            Invariant::new("novnc_http_200", true),
            Invariant::new("frontdoor_http_200", true),
        ];
        assert_eq!(select_playbook(&invariants), Playbook::Noop);
        assert_eq!(select_playbook(&[]), Playbook::Noop);
    }

    #[test]
    fn earlier_rule_wins_regardless_of_arrival_order() {
        let forward = failing(&["novnc_http_200", "serve_single_root_targets_frontdoor"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            select_playbook(&forward),
            Playbook::ReconcileFrontdoorServe
        );
        assert_eq!(
            select_playbook(&reversed),
            Playbook::ReconcileFrontdoorServe
        );

        let lower = failing(&["browser_process_alive", "websockify_listening"]);
        assert_eq!(select_playbook(&lower), Playbook::RecoverNovncWs);
    }

    #[test]
    fn selection_is_deterministic() {
        let invariants = vec![
            Invariant::new("vnc_display_alive", false),
            Invariant::new("unrelated_check", false),
            Invariant::new("novnc_http_200", true),
        ];
        let first = select_playbook(&invariants);
        for _ in 0..16 {
            assert_eq!(select_playbook(&invariants), first);
        }
        assert_eq!(first, Playbook::RestartBrowserSession);
    }

    #[test]
    fn duplicate_id_fails_closed() {
        let invariants = vec![
            Invariant::new("novnc_http_200", true),
            Invariant::new("novnc_http_200", false),
        ];
        assert_eq!(select_playbook(&invariants), Playbook::RecoverNovncWs);
    }

    #[test]
    fn playbook_ids_are_snake_case() {
        let json = serde_json::to_string(&Playbook::ReconcileFrontdoorServe).expect("json");
        assert_eq!(json, "\"reconcile_frontdoor_serve\"");
        assert_eq!(Playbook::RecoverNovncWs.to_string(), "recover_novnc_ws");
    }
}
