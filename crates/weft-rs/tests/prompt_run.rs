//! End-to-end runs through the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use weft_rs::prelude::*;

fn contents(elements: &[PromptElement]) -> Vec<&str> {
    elements.iter().map(|el| el.content.as_str()).collect()
}

#[tokio::test]
async fn hello_world_template() {
    let name = ActionInput::func(|_| ActionInput::from("World"));
    let llm = Llm::new(ScriptedCompletion::new(), false);
    let out: Vec<_> = llm
        .run(user().template(["Hello ", "!"], [name]), Value::Null)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(contents(&out), ["Hello ", "World", "!"]);
    assert_eq!(
        out.iter().map(|el| el.source).collect::<Vec<_>>(),
        [Source::Prompt, Source::Parameter, Source::Prompt]
    );
    assert!(out.iter().all(|el| el.role == Role::User));
}

#[tokio::test]
async fn nested_lists_report_leaf_addresses() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let tracker = |label: &'static str| {
        let seen = seen.clone();
        ActionInput::func(move |props| {
            seen.lock().unwrap().push(props.context.leaf_id.clone());
            ActionInput::from(label)
        })
    };
    let input = ActionInput::list([ActionInput::list([tracker("a"), tracker("b")]), tracker("c")]);

    let llm = Llm::new(ScriptedCompletion::new(), false);
    let out = llm.run(input, Value::Null).drain().await;
    assert!(out.is_ok());
    assert_eq!(*seen.lock().unwrap(), vec![vec![0, 0], vec![0, 1], vec![1]]);
}

#[tokio::test]
async fn skipped_slot_keeps_neighbouring_literals_separate() {
    let llm = Llm::new(ScriptedCompletion::new(), false);
    let template = system().template(["first", "second"], [Slot::absent()]);
    let out: Vec<_> = llm
        .run(template, Value::Null)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(contents(&out), ["first", "second"]);
}

#[tokio::test]
async fn chat_loop_waits_for_user_turns() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .reply(["Hi ", "Ada."])
            .reply(["Bye."]),
    );
    let llm = Llm::from_arc(completion.clone(), true);

    let turn = ActionInput::list([
        ActionInput::from(user().wrap(wait("message"))),
        ActionInput::from(ai("reply", GenOptions::new().with_stream(true))),
    ]);
    let prompt = ActionInput::list([
        ActionInput::from(system().text("You are friendly.")),
        ActionInput::from(loop_until(
            "chat",
            turn,
            LoopOptions::new().with_max_iterations(2),
        )),
    ]);

    let mut execution = llm.run(prompt, Value::Null);
    let state = execution.state().clone();
    state.push_queue("message", "Hello, I am Ada.");

    let feeder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.push_queue("message", "Goodbye.");
    });

    let mut received = Vec::new();
    while let Some(item) = execution.next().await {
        received.push(item.unwrap());
    }
    feeder.await.unwrap();

    let outputs = execution.outputs();
    let reply = |i: &str| {
        outputs
            .lookup(&["chat", i, "reply"])
            .and_then(OutputValue::as_text)
            .map(str::to_string)
    };
    assert_eq!(reply("0").as_deref(), Some("Hi Ada."));
    assert_eq!(reply("1").as_deref(), Some("Bye."));
    assert_eq!(execution.state().loop_status("chat"), Some(LoopStatus::NotRunning));

    // The second generation saw the whole first exchange.
    let requests = completion.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.stream && r.is_chat));
    let messages = requests[1].prompt.to_chat_messages();
    let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(messages[2].content, "Hi Ada.");

    let llm_elements = received.iter().filter(|el| el.source == Source::Llm).count();
    assert_eq!(llm_elements, 3);
}

#[tokio::test]
async fn outputs_serialize_as_nested_json() {
    let completion = ScriptedCompletion::new().reply(["x"]).reply(["y"]);
    let llm = Llm::new(completion, true);
    let prompt = map("items", vec!["a", "b"], |item, _| {
        ActionInput::list([
            ActionInput::from(user().text(item)),
            ActionInput::from(block("step").wrap(generate("out", GenOptions::new()))),
        ])
    });
    let outputs = llm.run(prompt, Value::Null).drain().await.unwrap();
    assert_eq!(
        serde_json::to_value(&outputs).unwrap(),
        json!({"items": [{"step": {"out": "x"}}, {"step": {"out": "y"}}]})
    );
}

#[tokio::test]
async fn dropping_the_stream_stops_generation() {
    let completion = Arc::new(ScriptedCompletion::new().reply(["never"]));
    let llm = Llm::from_arc(completion.clone(), true);
    let prompt = ActionInput::list([
        ActionInput::from("before"),
        ActionInput::from(ai("late", GenOptions::new())),
    ]);
    let mut execution = llm.run(prompt, Value::Null);
    let first = execution.next().await.unwrap().unwrap();
    assert_eq!(first.content, "before");
    drop(execution);
    assert!(completion.requests().is_empty());
    assert_eq!(completion.remaining(), 1);
}
