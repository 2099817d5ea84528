use proptest::prelude::*;

use stepper_core::models::{ReportNodeStatus, SeverityOrder, StatusComposer};

fn any_status() -> impl Strategy<Value = ReportNodeStatus> {
    prop::sample::select(ReportNodeStatus::ALL.to_vec())
}

fn any_order() -> impl Strategy<Value = SeverityOrder> {
    Just(ReportNodeStatus::ALL.to_vec())
        .prop_shuffle()
        .prop_map(|order| SeverityOrder::new(order).expect("permutation of every status"))
}

proptest! {
    #[test]
    fn composed_status_is_the_most_severe_child(
        statuses in prop::collection::vec(any_status(), 1..20)
    ) {
        let order = SeverityOrder::default();
        let composed = order.compose(statuses.clone());

        prop_assert!(statuses.contains(&composed));
        for status in &statuses {
            prop_assert!(order.rank(composed) <= order.rank(*status));
        }
    }

    #[test]
    fn composition_ignores_child_order(
        statuses in prop::collection::vec(any_status(), 0..20),
        order in any_order()
    ) {
        let mut reversed = statuses.clone();
        reversed.reverse();
        prop_assert_eq!(order.compose(statuses), order.compose(reversed));
    }

    #[test]
    fn composer_from_passed_matches_compose(
        statuses in prop::collection::vec(any_status(), 0..20)
    ) {
        let order = SeverityOrder::default();
        let mut composer = StatusComposer::new(ReportNodeStatus::Passed, order);
        for status in &statuses {
            composer.add(*status);
        }
        let expected = order.compose(
            std::iter::once(ReportNodeStatus::Passed).chain(statuses.iter().copied()),
        );
        prop_assert_eq!(composer.status(), expected);
    }

    #[test]
    fn failures_dominate_passing_statuses(
        passing in prop::collection::vec(
            prop::sample::select(vec![
                ReportNodeStatus::Passed,
                ReportNodeStatus::Skipped,
                ReportNodeStatus::Norun,
            ]),
            0..10
        ),
        failure in prop::sample::select(vec![
            ReportNodeStatus::Failed,
            ReportNodeStatus::TechnicalError,
        ])
    ) {
        let mut statuses = passing;
        statuses.push(failure);
        prop_assert_eq!(SeverityOrder::default().compose(statuses), failure);
    }
}

#[test]
fn empty_child_set_composes_to_passed() {
    assert_eq!(
        SeverityOrder::default().compose(Vec::new()),
        ReportNodeStatus::Passed
    );
}

#[test]
fn technical_error_outranks_failed() {
    let order = SeverityOrder::default();
    assert_eq!(
        order.compose([ReportNodeStatus::Failed, ReportNodeStatus::TechnicalError]),
        ReportNodeStatus::TechnicalError
    );
}
