use ocrlookup::dictionary::{
    CachedDictionary, DefinitionResult, DefinitionSource, DictionaryClient,
};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Answers a single HTTP request with `status` and `body`, returning the
/// request line it received.
fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut header = String::new();
            let n = reader.read_line(&mut header).unwrap();
            if n == 0 || header == "\r\n" {
                break;
            }
        }
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
        .unwrap();
        stream.flush().unwrap();
        request_line
    });
    (format!("http://{}/api/v2/entries/en/", addr), handle)
}

fn client_with_timeout(endpoint: &str, timeout: Duration) -> DictionaryClient {
    let http = DictionaryClient::http_builder(timeout).no_proxy().build().unwrap();
    DictionaryClient::with_http_client(endpoint, http).unwrap()
}

fn client(endpoint: &str) -> DictionaryClient {
    client_with_timeout(endpoint, Duration::from_secs(5))
}

#[test]
fn returns_the_single_definition() {
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"[{"word":"data","meanings":[{"partOfSpeech":"noun","definitions":[{"definition":"Information, especially in a scientific or computational context."}]}]}]"#,
    );
    let result = client(&endpoint).define("data");
    assert_eq!(
        result.definition().map(|d| d.text.as_str()),
        Some("Information, especially in a scientific or computational context.")
    );
    let request_line = server.join().unwrap();
    assert!(request_line.starts_with("GET /api/v2/entries/en/data HTTP/1.1"), "{request_line}");
}

#[test]
fn empty_array_is_not_found() {
    let (endpoint, server) = serve_once("200 OK", "[]");
    assert_eq!(client(&endpoint).define("qwxz"), DefinitionResult::NotFound);
    server.join().unwrap();
}

#[test]
fn missing_word_error_object_is_not_found() {
    let (endpoint, server) = serve_once(
        "404 Not Found",
        r#"{"title":"No Definitions Found","message":"Sorry pal, we couldn't find definitions for the word you were looking for.","resolution":"You can try the search again at later time or head to the web instead."}"#,
    );
    assert_eq!(client(&endpoint).define("qwxz"), DefinitionResult::NotFound);
    server.join().unwrap();
}

#[test]
fn server_error_is_unavailable() {
    let (endpoint, server) = serve_once("503 Service Unavailable", r#"{"error":"down"}"#);
    assert_eq!(client(&endpoint).define("data"), DefinitionResult::Unavailable);
    server.join().unwrap();
}

#[test]
fn connection_failure_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(&format!("http://{}/", addr)).define("data");
    assert_eq!(result, DefinitionResult::Unavailable);
    assert_eq!(
        result.to_string(),
        "Could not retrieve meaning. Check your internet connection."
    );
}

#[test]
fn slow_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((_stream, _)) = listener.accept() {
            thread::sleep(Duration::from_secs(3));
        }
    });

    let client = client_with_timeout(&format!("http://{}/", addr), Duration::from_millis(300));
    assert_eq!(client.define("data"), DefinitionResult::Unavailable);
}

#[test]
fn cached_lookup_hits_the_network_once() {
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"[{"meanings":[{"definitions":[{"definition":"A domesticated feline."}]}]}]"#,
    );
    let cached = CachedDictionary::new(Box::new(client(&endpoint)));
    let first = cached.define("cat");
    server.join().unwrap();

    // The responder is gone, so a second network call would fail.
    let second = cached.define("cat");
    assert_eq!(first, second);
    assert_eq!(second.to_string(), "A domesticated feline.");
}
