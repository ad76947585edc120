use std::sync::{Arc, Mutex};

use tokio_sm::{Selector, State, StateMachine};

type Actions = Arc<Mutex<Vec<String>>>;

fn record(actions: &Actions, action: String) {
    actions.lock().unwrap().push(action);
}

fn current(machine: &StateMachine) -> String {
    machine.current_id().unwrap_or_default()
}

/// Selector following a fixed table of ids.
fn table_selector(sequence: &[&str]) -> Selector {
    let sequence: Vec<String> = sequence.iter().map(|id| (*id).to_owned()).collect();
    Arc::new(move |state: &State| {
        sequence
            .windows(2)
            .find(|pair| pair[0] == state.id())
            .map(|pair| pair[1].clone())
    })
}

/// States "01" to "10", each logging its enter and leave.
fn numbered_states(actions: &Actions, selector: Selector) -> Vec<State> {
    (1..=10)
        .map(|i| {
            let enter = Arc::clone(actions);
            let leave = Arc::clone(actions);
            State::builder(format!("{i:02}"))
                .on_enter(move |machine| {
                    let actions = Arc::clone(&enter);
                    async move {
                        record(&actions, format!("enter {}", current(&machine)));
                        Ok(())
                    }
                })
                .on_leave(move |machine| {
                    let actions = Arc::clone(&leave);
                    async move {
                        record(&actions, format!("leave {}", current(&machine)));
                        Ok(())
                    }
                })
                .shared_selector(Arc::clone(&selector))
                .build()
        })
        .collect()
}

#[tokio::test]
async fn test_table_sequence() {
    let actions = Actions::default();
    let selector = table_selector(&["01", "02", "03", "05", "08", "09", "11"]);
    let machine = StateMachine::builder()
        .states(numbered_states(&actions, selector))
        .build();

    if machine.start("01", true).await.unwrap() {
        record(&actions, format!("process current state: {}", current(&machine)));
    }
    while machine.advance().await.unwrap() {
        record(&actions, format!("process current state: {}", current(&machine)));
    }

    let expected = [
        "enter 01",
        "process current state: 01",
        "leave 01",
        "enter 02",
        "process current state: 02",
        "leave 02",
        "enter 03",
        "process current state: 03",
        "leave 03",
        "enter 05",
        "process current state: 05",
        "leave 05",
        "enter 08",
        "process current state: 08",
        "leave 08",
        "enter 09",
        "process current state: 09",
        "leave 09",
    ];
    assert_eq!(*actions.lock().unwrap(), expected);

    // "11" is not registered: the machine is now stateless.
    assert!(machine.current_state().is_none());
    assert!(!machine.advance().await.unwrap());

    assert!(machine.emergency_switch("03", false).await.unwrap());
    assert_eq!(machine.current_id().as_deref(), Some("03"));
    assert_eq!(actions.lock().unwrap().len(), expected.len());
}

#[tokio::test]
async fn test_exhausted_table_blocks() {
    let actions = Actions::default();
    let selector = table_selector(&["01", "02", "03"]);
    let machine = StateMachine::builder()
        .states(numbered_states(&actions, selector))
        .build();

    machine.start("01", true).await.unwrap();
    assert!(machine.advance().await.unwrap());
    assert!(machine.advance().await.unwrap());

    // "03" is last in the table: blocked, not an error, and nothing runs.
    assert!(!machine.advance().await.unwrap());
    assert!(!machine.advance().await.unwrap());
    assert_eq!(machine.current_id().as_deref(), Some("03"));
    assert_eq!(
        *actions.lock().unwrap(),
        ["enter 01", "leave 01", "enter 02", "leave 02", "enter 03"]
    );
}

#[tokio::test]
async fn test_state_without_selector_never_advances() {
    let machine = StateMachine::builder()
        .state(State::builder("only").build())
        .build();

    assert!(!machine.advance().await.unwrap());
    assert!(machine.start("only", true).await.unwrap());
    assert!(!machine.advance().await.unwrap());
    assert_eq!(machine.current_id().as_deref(), Some("only"));
}

#[tokio::test]
async fn test_concurrent_advances_are_serialized() {
    let actions = Actions::default();
    let selector = table_selector(&["01", "02", "03", "04", "05", "06"]);
    let machine = StateMachine::builder()
        .states(numbered_states(&actions, selector))
        .build();
    machine.start("01", false).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let machine = Arc::clone(&machine);
        tasks.push(tokio::spawn(async move { machine.advance().await }));
    }
    let mut advanced = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() {
            advanced += 1;
        }
    }

    assert_eq!(advanced, 5);
    assert_eq!(machine.current_id().as_deref(), Some("06"));
    let actions = actions.lock().unwrap();
    for pair in actions.chunks(2) {
        let left = pair[0].strip_prefix("leave ").unwrap();
        let entered = pair[1].strip_prefix("enter ").unwrap();
        assert_ne!(left, entered);
    }
}
