//! Client-side commands against a running relay (stop, status, send).

use anyhow::{anyhow, Context, Result};
use relay_config_and_utils::Config;
use relay_ipc::{IpcClient, Method, Response};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Client for the relay described by `config`. A wildcard listen address
/// is reached over loopback.
pub(crate) fn client_for(config: &Config) -> Result<IpcClient> {
    let addr = config.listen_addr()?;
    Ok(IpcClient::new(reachable(addr)))
}

fn reachable(mut addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        _ => {}
    }
    addr
}

/// Unwrap a response into its result, turning a wire error into an error.
fn into_result(response: Response) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(anyhow!("{} (code {})", error.message, error.code));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Message bodies are JSON when they parse as JSON, plain text otherwise.
fn parse_body(body: String) -> Value {
    match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => Value::String(body),
    }
}

/// Stop the relay.
pub async fn stop_relay(config: &Config) -> Result<()> {
    let client = client_for(config)?;

    if !client.is_running().await {
        println!("Relay is not running");
        return Ok(());
    }

    let response = client
        .call_method_with_params(Method::Shutdown, json!({ "secret": config.shared_secret }))
        .await
        .context("Failed to reach relay")?;
    into_result(response)?;
    println!("Relay shutdown initiated");

    // Wait for the relay to stop (up to 3 seconds)
    for _ in 0..30 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if !client.is_running().await {
            println!("Relay stopped");
            return Ok(());
        }
    }

    Err(anyhow!("relay is still answering after shutdown"))
}

/// Print relay health, or one robot's presence and backlog.
pub async fn check_status(config: &Config, recipient: Option<&str>) -> Result<()> {
    let client = client_for(config)?;

    let Some(recipient) = recipient else {
        match client.call_method(Method::Health).await {
            Ok(response) => {
                let result = into_result(response)?;
                println!("Relay is running ({})", result["status"].as_str().unwrap_or("unknown"));
                println!("  Version: {}", result["version"].as_str().unwrap_or("unknown"));
                println!("  Store:   {}", result["store"].as_str().unwrap_or("unknown"));
                println!("  Online:  {}", result["online"]);
                println!("  Uptime:  {}s", result["uptime_secs"]);
            }
            Err(e) => {
                println!("Relay is not running: {}", e);
            }
        }
        return Ok(());
    };

    let response = client
        .call_method_with_params(
            Method::OutboxStatus,
            json!({ "recipient": recipient, "secret": config.shared_secret }),
        )
        .await
        .context("Failed to reach relay")?;
    let result = into_result(response)?;

    let online = result["online"].as_bool().unwrap_or(false);
    println!("{} is {}", recipient, if online { "online" } else { "offline" });
    println!("  Pending: {}", result["pending"]);
    Ok(())
}

/// Send one message to a robot.
pub async fn send_message(
    config: &Config,
    recipient: &str,
    body: String,
    from: Option<String>,
) -> Result<()> {
    let response = client_for(config)?
        .call_method_with_params(
            Method::MessageSend,
            json!({
                "recipient": recipient,
                "body": parse_body(body),
                "from": from,
                "secret": config.shared_secret,
            }),
        )
        .await
        .context("Failed to reach relay")?;
    let result = into_result(response)?;

    match result["sequence"].as_i64() {
        Some(sequence) => println!("{} (#{})", result["outcome"].as_str().unwrap_or("sent"), sequence),
        None => println!("{}", result["outcome"].as_str().unwrap_or("sent")),
    }
    Ok(())
}

/// Relay an SMS and print the reply its sender would get.
pub async fn send_sms(
    config: &Config,
    recipient: &str,
    text: String,
    from: String,
    to: String,
) -> Result<()> {
    let response = client_for(config)?
        .call_method_with_params(
            Method::SmsReceive,
            json!({
                "recipient": recipient,
                "smsText": text,
                "smsFrom": from,
                "smsTo": to,
                "secret": config.shared_secret,
            }),
        )
        .await
        .context("Failed to reach relay")?;

    // A persistence failure still carries the reply for the SMS sender.
    let reply = match (&response.result, &response.error) {
        (Some(result), _) => result["reply"].as_str().map(str::to_string),
        (None, Some(error)) => error
            .data
            .as_ref()
            .and_then(|d| d["reply"].as_str())
            .map(str::to_string),
        (None, None) => None,
    };
    if let Some(reply) = reply {
        println!("{}", reply);
    }
    into_result(response)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_listen_is_reached_over_loopback() {
        let v4: SocketAddr = "0.0.0.0:3003".parse().unwrap();
        assert_eq!(reachable(v4), "127.0.0.1:3003".parse::<SocketAddr>().unwrap());

        let v6: SocketAddr = "[::]:3003".parse().unwrap();
        assert_eq!(reachable(v6), "[::1]:3003".parse::<SocketAddr>().unwrap());

        let fixed: SocketAddr = "10.0.0.5:3003".parse().unwrap();
        assert_eq!(reachable(fixed), fixed);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(r#"{"cmd":"sit"}"#.to_string()), json!({ "cmd": "sit" }));
        assert_eq!(parse_body("sit down".to_string()), json!("sit down"));
    }

    #[test]
    fn test_into_result_surfaces_wire_errors() {
        let ok = Response::success("1", json!({ "outcome": "queued" }));
        assert_eq!(into_result(ok).unwrap()["outcome"], "queued");

        let err = Response::error("2", -32001, "Unauthorized");
        let message = into_result(err).unwrap_err().to_string();
        assert!(message.contains("Unauthorized"));
    }
}
