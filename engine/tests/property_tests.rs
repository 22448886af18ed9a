use proptest::prelude::*;
use sdk::types::OperationType;
use waypoint_engine::agent::ContextStore;
use waypoint_engine::planner::{parse, PlannerReply};

#[derive(Debug, Clone)]
enum Entry {
    Operation(OperationType, String, String),
    Note(String),
}

fn operation_type() -> impl Strategy<Value = OperationType> {
    prop_oneof![
        Just(OperationType::Read),
        Just(OperationType::Search),
        Just(OperationType::Create),
        Just(OperationType::Edit),
        Just(OperationType::Delete),
        Just(OperationType::Move),
        Just(OperationType::External),
    ]
}

fn entry() -> impl Strategy<Value = Entry> {
    prop_oneof![
        (operation_type(), "[a-z/]{1,20}\\.rs", ".{0,200}")
            .prop_map(|(kind, path, description)| Entry::Operation(kind, path, description)),
        ".{0,200}".prop_map(Entry::Note),
    ]
}

fn fill(store: &mut ContextStore, entries: &[Entry]) {
    for entry in entries {
        match entry {
            Entry::Operation(kind, path, description) => {
                store.add_operation(*kind, path, description)
            }
            Entry::Note(text) => store.add_note(text.clone()),
        }
    }
}

proptest! {
    // Without trimming, adds only ever grow the journal.
    #[test]
    fn test_adds_only_grow(entries in prop::collection::vec(entry(), 0..40)) {
        let mut store = ContextStore::new();
        let mut operations = 0;
        let mut notes = 0;

        for entry in &entries {
            fill(&mut store, std::slice::from_ref(entry));
            match entry {
                Entry::Operation(..) => {
                    operations += 1;
                    notes += 1;
                }
                Entry::Note(_) => notes += 1,
            }
            prop_assert_eq!(store.operations().len(), operations);
            prop_assert_eq!(store.notes().len(), notes);
        }
    }

    #[test]
    fn test_reset_empties_store(entries in prop::collection::vec(entry(), 0..40)) {
        let mut store = ContextStore::new();
        fill(&mut store, &entries);
        store.set_last_result(true, "done");

        store.reset();

        prop_assert!(store.operations().is_empty());
        prop_assert!(store.notes().is_empty());
        prop_assert!(store.last_result().is_none());
        prop_assert_eq!(store.total_tokens(), 0);
    }

    // After trimming, the journal fits the budget unless both collections
    // are empty.
    #[test]
    fn test_bounded_summary_respects_budget(
        entries in prop::collection::vec(entry(), 0..60),
        budget in 0usize..400,
    ) {
        let mut store = ContextStore::new();
        fill(&mut store, &entries);
        let before = store.total_tokens();

        let summary = store.bounded_summary(budget);

        let fits = store.total_tokens() <= budget;
        let emptied = store.operations().is_empty() && store.notes().is_empty();
        prop_assert!(fits || emptied);
        prop_assert_eq!(summary.report.tokens_before, before);
        prop_assert_eq!(summary.report.tokens_after, store.total_tokens());
    }

    // Notes are only evicted once every operation is gone, and survivors
    // keep their order.
    #[test]
    fn test_eviction_order(
        entries in prop::collection::vec(entry(), 1..60),
        budget in 0usize..400,
    ) {
        let mut store = ContextStore::new();
        fill(&mut store, &entries);
        let operations_before = store.operations().to_vec();
        let notes_before = store.notes().to_vec();

        let summary = store.bounded_summary(budget);

        if summary.report.notes_evicted > 0 {
            prop_assert!(store.operations().is_empty());
        }
        prop_assert_eq!(
            store.operations(),
            &operations_before[summary.report.operations_evicted..]
        );
        prop_assert_eq!(store.notes(), &notes_before[summary.report.notes_evicted..]);
    }

    #[test]
    fn test_parse_never_panics(text in ".{0,400}") {
        let _ = parse(&text);
    }

    // Any syntactically valid reply with an object action yields that action.
    #[test]
    fn test_parse_wrapped_action(
        prose in "[a-zA-Z ,.]{0,80}",
        name in "[A-Z_]{1,20}",
        file_path in "[a-z/]{0,30}",
    ) {
        let reply = format!(
            "{}\n{{\"action\": {{\"name\": \"{}\", \"filePath\": \"{}\"}}}}",
            prose, name, file_path
        );

        match parse(&reply) {
            Ok(PlannerReply::Single(action)) => {
                prop_assert_eq!(action.name, name);
                prop_assert_eq!(action.file_path, file_path);
            }
            other => prop_assert!(false, "unexpected parse result: {:?}", other),
        }
    }
}
