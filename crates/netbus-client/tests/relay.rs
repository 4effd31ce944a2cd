//! Clients talking to each other through a relay server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use netbus_client::{Client, ClientOptions, ConnectionState, Endpoint};
use netbus_protocol::Delimiter;
use netbus_server::{RelayServer, ServerConfig};
use serde_json::{Value, json};

type Inbox = Arc<Mutex<Vec<Vec<Value>>>>;

async fn start_server(config: ServerConfig) -> (Arc<RelayServer>, Endpoint) {
    let server = Arc::new(RelayServer::bind(config).await.unwrap());
    let endpoint = server.local_endpoint().clone();
    let running = Arc::clone(&server);
    tokio::spawn(async move { running.run().await });
    (server, endpoint)
}

async fn relay() -> (Arc<RelayServer>, Endpoint) {
    start_server(ServerConfig::new(Endpoint::tcp("127.0.0.1:0"))).await
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

fn inbox(client: &Client, event: &str) -> Inbox {
    let inbox = Inbox::default();
    let sink = Arc::clone(&inbox);
    client.on(event, move |args| sink.lock().unwrap().push(args.to_vec()));
    inbox
}

#[tokio::test]
async fn broadcast_reaches_other_subscribers_only() {
    let (server, endpoint) = relay().await;

    let alice = Client::new();
    let alice_inbox = inbox(&alice, "chat");
    let _alice_conn = alice.connect(&endpoint).await.unwrap();

    let bob = Client::new();
    let bob_inbox = inbox(&bob, "chat");
    let _bob_conn = bob.connect(&endpoint).await.unwrap();

    let carol = Client::new();
    let carol_inbox = inbox(&carol, "other");
    let _carol_conn = carol.connect(&endpoint).await.unwrap();

    wait_for(|| server.broker().subscriber_count("chat") == 2).await;

    let args = vec![json!(1), json!("2"), json!(true), json!({"name": "luca"})];
    alice.emit("chat", &args);

    wait_for(|| !bob_inbox.lock().unwrap().is_empty()).await;
    assert_eq!(*bob_inbox.lock().unwrap(), vec![args.clone()]);

    // The sender's listeners ran locally, once; the server does not echo.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*alice_inbox.lock().unwrap(), vec![args]);
    assert!(carol_inbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn removing_last_listener_stops_delivery() {
    let (server, endpoint) = relay().await;

    let listener = Client::new();
    let received = Inbox::default();
    let sink = Arc::clone(&received);
    let id = listener.on("tick", move |args| sink.lock().unwrap().push(args.to_vec()));
    let _conn = listener.connect(&endpoint).await.unwrap();
    wait_for(|| server.broker().subscriber_count("tick") == 1).await;

    assert!(listener.off("tick", id));
    wait_for(|| server.broker().subscriber_count("tick") == 0).await;

    let sender = Client::new();
    let _sender_conn = sender.connect(&endpoint).await.unwrap();
    sender.emit("tick", &[json!(1)]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn subscriptions_survive_reconnect() {
    let (server, endpoint) = relay().await;

    let client = Client::new();
    let received = inbox(&client, "news");
    let first = client.connect(&endpoint).await.unwrap();
    wait_for(|| server.broker().subscriber_count("news") == 1).await;

    first.close();
    first.closed().await;
    wait_for(|| server.broker().subscriber_count("news") == 0).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Registered while disconnected: nothing is sent until the next connect.
    let late = inbox(&client, "sports");
    let _second = client.connect(&endpoint).await.unwrap();
    wait_for(|| {
        server.broker().subscriber_count("news") == 1
            && server.broker().subscriber_count("sports") == 1
    })
    .await;

    let sender = Client::new();
    let _sender_conn = sender.connect(&endpoint).await.unwrap();
    sender.emit("news", &[json!("headline")]);
    sender.emit("sports", &[json!(3), json!(1)]);

    wait_for(|| !received.lock().unwrap().is_empty() && !late.lock().unwrap().is_empty()).await;
    assert_eq!(*received.lock().unwrap(), vec![vec![json!("headline")]]);
    assert_eq!(*late.lock().unwrap(), vec![vec![json!(3), json!(1)]]);
}

#[tokio::test]
async fn once_listener_unsubscribes_remotely() {
    let (server, endpoint) = relay().await;

    let client = Client::new();
    let received = Inbox::default();
    let sink = Arc::clone(&received);
    client.once("ready", move |args| sink.lock().unwrap().push(args.to_vec()));
    let _conn = client.connect(&endpoint).await.unwrap();
    wait_for(|| server.broker().subscriber_count("ready") == 1).await;

    let sender = Client::new();
    let _sender_conn = sender.connect(&endpoint).await.unwrap();
    sender.emit("ready", &[]);

    wait_for(|| server.broker().subscriber_count("ready") == 0).await;
    assert_eq!(*received.lock().unwrap(), vec![Vec::<Value>::new()]);
    assert!(!client.is_subscribed("ready"));
}

#[tokio::test]
async fn custom_delimiter_end_to_end() {
    let delimiter = Delimiter::new("\n").unwrap();
    let (server, endpoint) = start_server(
        ServerConfig::new(Endpoint::tcp("127.0.0.1:0")).with_delimiter(delimiter.clone()),
    )
    .await;
    let options = ClientOptions::default().with_delimiter(delimiter);

    let listener = Client::with_options(options.clone());
    let received = inbox(&listener, "line");
    let _conn = listener.connect(&endpoint).await.unwrap();
    wait_for(|| server.broker().subscriber_count("line") == 1).await;

    let sender = Client::with_options(options);
    let _sender_conn = sender.connect(&endpoint).await.unwrap();
    sender.emit("line", &[json!("a\nb")]);

    wait_for(|| !received.lock().unwrap().is_empty()).await;
    assert_eq!(*received.lock().unwrap(), vec![vec![json!("a\nb")]]);
}

#[tokio::test]
async fn server_shutdown_disconnects_clients() {
    let config = ServerConfig::new(Endpoint::tcp("127.0.0.1:0"));
    let server = RelayServer::bind(config).await.unwrap();
    let endpoint = server.local_endpoint().clone();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(async move {
        server
            .run_until_shutdown(async {
                let _ = stopped.await;
            })
            .await
    });

    let client = Client::new();
    let _ = inbox(&client, "x");
    let conn = client.connect(&endpoint).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    stop.send(()).unwrap();
    serving.await.unwrap().unwrap();

    // Stopping the accept loop leaves established connections to their tasks;
    // closing from our side still works.
    conn.close();
    conn.closed().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
