//! Gate predicates and the item naming transform.
//!
//! Nothing here talks to the remote system. Callers gather item statuses and
//! line or requirement values, and these functions decide whether an order
//! may move on.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use crate::gateway::{OrderLine, Requirement};
use crate::store::{LineSnapshot, RequirementSnapshot};

/// Item status that lets an order through a gate
pub const APPROVED: &str = "APP";

const QUANTITY_TOLERANCE: f64 = 1e-6;

/// The two items derived from a base item code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    /// Printed substrate bought at site A
    Substrate,
    /// Finished good sold from site B
    FinishedGood,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Substrate, ItemKind::FinishedGood];

    pub fn prefix(&self) -> &'static str {
        match self {
            ItemKind::Substrate => "16P4-",
            ItemKind::FinishedGood => "1600-",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Substrate => "substrate",
            ItemKind::FinishedGood => "finished good",
        }
    }

    /// Kind of an already-derived code
    pub fn of(code: &str) -> Option<ItemKind> {
        let upper = code.trim().to_ascii_uppercase();
        ItemKind::ALL
            .into_iter()
            .find(|kind| upper.starts_with(kind.prefix()))
    }
}

/// Strip every known prefix from an item code, leaving the core code
pub fn core_of(code: &str) -> String {
    let mut core = code.trim();
    loop {
        let stripped = ItemKind::ALL.into_iter().find_map(|kind| {
            let prefix = kind.prefix();
            core.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &core[prefix.len()..])
        });
        match stripped {
            Some(rest) => core = rest,
            None => return core.to_string(),
        }
    }
}

/// Dependent item code for a base or core code
pub fn derive_dependent(code: &str, kind: ItemKind) -> String {
    format!("{}{}", kind.prefix(), core_of(code))
}

/// Remote statuses of a base item and its dependents. `None` means missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub base_code: String,
    pub base_status: Option<String>,
    pub substrate_status: Option<String>,
    pub finished_good_status: Option<String>,
}

impl ItemSnapshot {
    pub fn substrate_code(&self) -> String {
        derive_dependent(&self.base_code, ItemKind::Substrate)
    }

    pub fn finished_good_code(&self) -> String {
        derive_dependent(&self.base_code, ItemKind::FinishedGood)
    }

    fn missing(&self) -> Vec<ItemKind> {
        let mut missing = Vec::new();
        if self.substrate_status.is_none() {
            missing.push(ItemKind::Substrate);
        }
        if self.finished_good_status.is_none() {
            missing.push(ItemKind::FinishedGood);
        }
        missing
    }
}

fn approved(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.trim().eq_ignore_ascii_case(APPROVED))
}

fn shown(status: Option<&str>) -> &str {
    status.unwrap_or("missing")
}

/// Outcome of an item gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemGateDecision {
    Pass,
    BaseNotApproved { status: Option<String> },
    /// Dependents that must be created before anything else happens
    CreateMissing(Vec<ItemKind>),
    SubstrateNotApproved { status: Option<String> },
    FinishedGoodNotApproved { status: Option<String> },
}

impl ItemGateDecision {
    pub fn reason(&self, snapshot: &ItemSnapshot) -> String {
        match self {
            ItemGateDecision::Pass => String::new(),
            ItemGateDecision::BaseNotApproved { status } => format!(
                "Base item {} not APP (status={}).",
                snapshot.base_code,
                shown(status.as_deref())
            ),
            ItemGateDecision::CreateMissing(_) => {
                "Items created in WAIT. Stop until CSR approves (APP).".to_string()
            }
            ItemGateDecision::SubstrateNotApproved { status } => format!(
                "Substrate item {} not APP (status={}). Stop until APP.",
                snapshot.substrate_code(),
                shown(status.as_deref())
            ),
            ItemGateDecision::FinishedGoodNotApproved { status } => format!(
                "Finished-good item {} not APP (status={}). Stop until APP.",
                snapshot.finished_good_code(),
                shown(status.as_deref())
            ),
        }
    }
}

/// Decide whether an order may pass an item gate.
///
/// The finished good only has to be approved where a site-B sales order is
/// about to be created.
pub fn evaluate_item_gate(snapshot: &ItemSnapshot, require_finished_good: bool) -> ItemGateDecision {
    if !approved(snapshot.base_status.as_deref()) {
        return ItemGateDecision::BaseNotApproved {
            status: snapshot.base_status.clone(),
        };
    }

    let missing = snapshot.missing();
    if !missing.is_empty() {
        return ItemGateDecision::CreateMissing(missing);
    }

    if !approved(snapshot.substrate_status.as_deref()) {
        return ItemGateDecision::SubstrateNotApproved {
            status: snapshot.substrate_status.clone(),
        };
    }

    if require_finished_good && !approved(snapshot.finished_good_status.as_deref()) {
        return ItemGateDecision::FinishedGoodNotApproved {
            status: snapshot.finished_good_status.clone(),
        };
    }

    ItemGateDecision::Pass
}

/// Requirement items that do not print onto the substrate the order asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstrateMismatch {
    pub base_item: String,
    pub expected: String,
    pub invalid: Vec<String>,
    pub found: Vec<String>,
}

impl fmt::Display for SubstrateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Printed substrate mismatch: base={} expected={} invalid=[{}] found=[{}]",
            self.base_item,
            self.expected,
            self.invalid.join(", "),
            self.found.join(", ")
        )
    }
}

/// Every substrate-prefixed requirement item must be exactly the substrate
/// derived from the order's base item. Other items are ignored.
pub fn validate_printed_substrate<S: AsRef<str>>(
    base_item: &str,
    requirement_items: &[S],
) -> Result<(), SubstrateMismatch> {
    let found: Vec<String> = requirement_items
        .iter()
        .map(|item| item.as_ref().trim().to_ascii_uppercase())
        .filter(|item| item.starts_with(ItemKind::Substrate.prefix()))
        .collect();
    if found.is_empty() {
        return Ok(());
    }

    let expected = derive_dependent(base_item, ItemKind::Substrate).to_ascii_uppercase();
    let invalid: Vec<String> = found.iter().filter(|item| **item != expected).cloned().collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(SubstrateMismatch {
            base_item: base_item.trim().to_string(),
            expected,
            invalid,
            found,
        })
    }
}

const SITE_B_JOB_HOLD_PATTERNS: [&str; 4] = [
    r"(?i)on\s+hold",
    r"(?i)did not produce a job code",
    r"(?i)valid estimate cannot be determined",
    r"(?i)job code missing",
];

static SITE_B_JOB_HOLDS: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(SITE_B_JOB_HOLD_PATTERNS).unwrap_or_else(|_| RegexSet::empty()));

/// Whether a site-B job rejection means "wait" rather than "broken"
pub fn is_site_b_job_hold(message: &str) -> bool {
    SITE_B_JOB_HOLDS.is_match(message)
}

pub fn quantities_match(left: f64, right: f64) -> bool {
    (left - right).abs() <= QUANTITY_TOLERANCE
}

/// One field of one order line that moved since the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct LineDrift {
    pub line_number: i64,
    pub field: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl LineDrift {
    /// Change-log field name, e.g. `line 1 quantity`
    pub fn field_name(&self) -> String {
        format!("line {} {}", self.line_number, self.field)
    }
}

fn render_qty(qty: f64) -> String {
    if qty.fract() == 0.0 {
        format!("{qty:.0}")
    } else {
        qty.to_string()
    }
}

/// Compare current upstream lines against the stored baseline
pub fn line_drift(baseline: &[LineSnapshot], current: &[OrderLine]) -> Vec<LineDrift> {
    let before: BTreeMap<i64, &LineSnapshot> = baseline.iter().map(|l| (l.line_number, l)).collect();
    let after: BTreeMap<i64, &OrderLine> = current.iter().map(|l| (l.line_number, l)).collect();
    let numbers: BTreeSet<i64> = before.keys().chain(after.keys()).copied().collect();

    let mut drift = Vec::new();
    for number in numbers {
        match (before.get(&number), after.get(&number)) {
            (Some(old), Some(new)) => {
                if !quantities_match(old.quantity, new.ordered_qty) {
                    drift.push(LineDrift {
                        line_number: number,
                        field: "quantity",
                        old_value: Some(render_qty(old.quantity)),
                        new_value: Some(render_qty(new.ordered_qty)),
                    });
                }
                if old.required_date != new.required_date {
                    drift.push(LineDrift {
                        line_number: number,
                        field: "required_date",
                        old_value: old.required_date.map(|d| d.to_string()),
                        new_value: new.required_date.map(|d| d.to_string()),
                    });
                }
            }
            (Some(old), None) => drift.push(LineDrift {
                line_number: number,
                field: "quantity",
                old_value: Some(render_qty(old.quantity)),
                new_value: None,
            }),
            (None, Some(new)) => drift.push(LineDrift {
                line_number: number,
                field: "quantity",
                old_value: None,
                new_value: Some(render_qty(new.ordered_qty)),
            }),
            (None, None) => {}
        }
    }
    drift
}

/// A requirement whose quantity or date differs from the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementDelta {
    pub item_code: String,
    pub old_quantity: Option<f64>,
    /// Zero when the item dropped out of the job
    pub new_quantity: f64,
    pub old_required_date: Option<chrono::NaiveDate>,
    pub required_date: Option<chrono::NaiveDate>,
}

impl RequirementDelta {
    pub fn quantity_changed(&self) -> bool {
        !matches!(self.old_quantity, Some(old) if quantities_match(old, self.new_quantity))
    }

    pub fn date_changed(&self) -> bool {
        self.old_required_date != self.required_date
    }
}

/// Requirements that moved since the baseline, summed per item
pub fn requirement_drift(
    baseline: &[RequirementSnapshot],
    current: &[Requirement],
) -> Vec<RequirementDelta> {
    let before: BTreeMap<String, &RequirementSnapshot> = baseline
        .iter()
        .map(|r| (r.item_code.trim().to_ascii_uppercase(), r))
        .collect();
    let after: BTreeMap<String, RequirementSnapshot> = requirement_baseline(current)
        .into_iter()
        .map(|r| (r.item_code.to_ascii_uppercase(), r))
        .collect();
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let delta = match (old, after.get(key)) {
                (_, Some(new)) => RequirementDelta {
                    item_code: new.item_code.clone(),
                    old_quantity: old.map(|o| o.quantity),
                    new_quantity: new.quantity,
                    old_required_date: old.and_then(|o| o.required_date),
                    required_date: new.required_date,
                },
                (Some(old), None) => RequirementDelta {
                    item_code: old.item_code.trim().to_string(),
                    old_quantity: Some(old.quantity),
                    new_quantity: 0.0,
                    old_required_date: old.required_date,
                    required_date: old.required_date,
                },
                (None, None) => return None,
            };
            (delta.quantity_changed() || delta.date_changed()).then_some(delta)
        })
        .collect()
}

/// Baseline rows for a set of requirements, summed per item
pub fn requirement_baseline(current: &[Requirement]) -> Vec<RequirementSnapshot> {
    let mut totals: BTreeMap<String, RequirementSnapshot> = BTreeMap::new();
    for requirement in current {
        let key = requirement.item_code.trim().to_ascii_uppercase();
        totals
            .entry(key)
            .and_modify(|snapshot| snapshot.quantity += requirement.required_qty)
            .or_insert_with(|| RequirementSnapshot {
                item_code: requirement.item_code.trim().to_string(),
                quantity: requirement.required_qty,
                required_date: requirement.required_date,
            });
    }
    totals.into_values().collect()
}

pub fn line_baseline(current: &[OrderLine]) -> Vec<LineSnapshot> {
    current
        .iter()
        .map(|line| LineSnapshot {
            line_number: line.line_number,
            item_code: line.item_code.clone(),
            quantity: line.ordered_qty,
            required_date: line.required_date,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot(base: Option<&str>, substrate: Option<&str>, finished: Option<&str>) -> ItemSnapshot {
        ItemSnapshot {
            base_code: "2300-NPU01-0686T".to_string(),
            base_status: base.map(str::to_string),
            substrate_status: substrate.map(str::to_string),
            finished_good_status: finished.map(str::to_string),
        }
    }

    #[test]
    fn naming_transform_round_trips() {
        assert_eq!(core_of("16P4-2300-ABC"), "2300-ABC");
        assert_eq!(core_of(" 1600-2300-ABC "), "2300-ABC");
        assert_eq!(core_of("16p4-2300-ABC"), "2300-ABC");
        assert_eq!(core_of("2300-ABC"), "2300-ABC");
        assert_eq!(derive_dependent("2300-ABC", ItemKind::Substrate), "16P4-2300-ABC");
        assert_eq!(derive_dependent("16P4-2300-ABC", ItemKind::FinishedGood), "1600-2300-ABC");
        assert_eq!(ItemKind::of("1600-X"), Some(ItemKind::FinishedGood));
        assert_eq!(ItemKind::of("2300-X"), None);
    }

    #[test]
    fn base_item_must_be_approved_first() {
        let decision = evaluate_item_gate(&snapshot(Some("WAIT"), None, None), false);
        assert_eq!(decision, ItemGateDecision::BaseNotApproved { status: Some("WAIT".to_string()) });

        let missing_base = snapshot(None, None, None);
        assert!(evaluate_item_gate(&missing_base, false)
            .reason(&missing_base)
            .contains("status=missing"));
    }

    #[test]
    fn only_missing_dependents_are_created() {
        let decision = evaluate_item_gate(&snapshot(Some("APP"), Some("APP"), None), false);
        assert_eq!(decision, ItemGateDecision::CreateMissing(vec![ItemKind::FinishedGood]));

        let decision = evaluate_item_gate(&snapshot(Some("app"), None, None), true);
        assert_eq!(
            decision,
            ItemGateDecision::CreateMissing(vec![ItemKind::Substrate, ItemKind::FinishedGood])
        );
    }

    #[test]
    fn finished_good_approval_only_when_required() {
        let items = snapshot(Some("APP"), Some("APP"), Some("WAIT"));
        assert_eq!(evaluate_item_gate(&items, false), ItemGateDecision::Pass);
        let decision = evaluate_item_gate(&items, true);
        assert!(matches!(decision, ItemGateDecision::FinishedGoodNotApproved { .. }));
        assert!(decision.reason(&items).contains("1600-2300-NPU01-0686T"));

        let items = snapshot(Some("APP"), Some("WAIT"), Some("APP"));
        assert!(matches!(
            evaluate_item_gate(&items, false),
            ItemGateDecision::SubstrateNotApproved { .. }
        ));
    }

    #[test]
    fn printed_substrate_must_match_base() {
        assert!(validate_printed_substrate("2300-ABC", &["16P4-2300-ABC", "INK-01"]).is_ok());
        assert!(validate_printed_substrate("2300-ABC", &["INK-01"]).is_ok());

        let mismatch = validate_printed_substrate("2300-ABC", &["16p4-2300-ABC", "16P4-2300-XYZ"]).unwrap_err();
        assert_eq!(mismatch.expected, "16P4-2300-ABC");
        assert_eq!(mismatch.invalid, vec!["16P4-2300-XYZ"]);
        assert_eq!(mismatch.found.len(), 2);
    }

    #[test]
    fn site_b_job_hold_classification() {
        assert!(is_site_b_job_hold("Sales order is ON HOLD"));
        assert!(is_site_b_job_hold("JOB_P2 did not produce a Job Code: none"));
        assert!(is_site_b_job_hold("A valid estimate cannot be determined"));
        assert!(is_site_b_job_hold("job code missing from result"));
        assert!(!is_site_b_job_hold("Customer credit limit exceeded"));
        assert_eq!(SITE_B_JOB_HOLDS.len(), SITE_B_JOB_HOLD_PATTERNS.len());
    }

    #[test]
    fn line_drift_reports_quantity_and_date_changes() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1);
        let baseline = vec![LineSnapshot {
            line_number: 1,
            item_code: "2300-ABC".to_string(),
            quantity: 1000.0,
            required_date: date,
        }];
        let same = vec![OrderLine {
            line_number: 1,
            item_code: "2300-ABC".to_string(),
            ordered_qty: 1000.0,
            required_date: date,
        }];
        assert!(line_drift(&baseline, &same).is_empty());

        let changed = vec![OrderLine {
            ordered_qty: 1500.0,
            required_date: NaiveDate::from_ymd_opt(2026, 3, 8),
            ..same[0].clone()
        }];
        let drift = line_drift(&baseline, &changed);
        assert_eq!(drift.len(), 2);
        assert_eq!(drift[0].field_name(), "line 1 quantity");
        assert_eq!(drift[0].old_value.as_deref(), Some("1000"));
        assert_eq!(drift[0].new_value.as_deref(), Some("1500"));
        assert_eq!(drift[1].field, "required_date");
    }

    #[test]
    fn requirement_drift_sums_per_item() {
        let requirement = |qty: f64| Requirement {
            requirement_id: None,
            job_code: "P4J-1".to_string(),
            item_code: "16P4-2300-ABC".to_string(),
            required_qty: qty,
            required_date: None,
            dim_a: 0.0,
            order_line: Some(1),
        };
        let current = vec![requirement(400.0), requirement(600.0)];
        let baseline = requirement_baseline(&current);
        assert_eq!(baseline.len(), 1);
        assert_eq!(baseline[0].quantity, 1000.0);
        assert!(requirement_drift(&baseline, &current).is_empty());

        let grown = vec![requirement(1200.0)];
        let delta = requirement_drift(&baseline, &grown);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].old_quantity, Some(1000.0));
        assert_eq!(delta[0].new_quantity, 1200.0);
        assert!(!delta[0].date_changed());
    }

    fn dated(item: &str, qty: f64, date: Option<NaiveDate>) -> Requirement {
        Requirement {
            requirement_id: None,
            job_code: "P4J-1".to_string(),
            item_code: item.to_string(),
            required_qty: qty,
            required_date: date,
            dim_a: 0.0,
            order_line: Some(1),
        }
    }

    #[test]
    fn requirement_drift_reports_moved_dates() {
        let march = NaiveDate::from_ymd_opt(2026, 3, 2);
        let april = NaiveDate::from_ymd_opt(2026, 4, 15);
        let baseline = requirement_baseline(&[dated("16P4-2300-ABC", 1000.0, march)]);

        let delta = requirement_drift(&baseline, &[dated("16P4-2300-ABC", 1000.0, april)]);
        assert_eq!(delta.len(), 1);
        assert!(!delta[0].quantity_changed());
        assert!(delta[0].date_changed());
        assert_eq!(delta[0].old_required_date, march);
        assert_eq!(delta[0].required_date, april);
    }

    #[test]
    fn requirement_drift_zeroes_dropped_items() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2);
        let baseline = requirement_baseline(&[
            dated("16P4-2300-ABC", 1000.0, date),
            dated("16P4-2300-XYZ", 250.0, date),
        ]);

        let delta = requirement_drift(&baseline, &[dated("16p4-2300-abc", 1000.0, date)]);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].item_code, "16P4-2300-XYZ");
        assert_eq!(delta[0].old_quantity, Some(250.0));
        assert_eq!(delta[0].new_quantity, 0.0);
        assert!(!delta[0].date_changed());
    }
}
