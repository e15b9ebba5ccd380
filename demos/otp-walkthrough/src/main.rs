//! Walks through the verification flow against a live backend.
//!
//! ```text
//! OTPGATE_URL=http://127.0.0.1:8000 RUST_LOG=otpgate=debug cargo run -p otp-walkthrough
//! ```
//!
//! The session id is kept in `OTPGATE_STORE` (default
//! `otpgate-session.json`), so quitting at the OTP prompt and starting
//! again resumes the same session.

use otpgate::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;

// ---------------------------------------------------------------------------
// Prompting
// ---------------------------------------------------------------------------

async fn prompt(input: &mut Input, label: &str) -> Option<String> {
    eprint!("{label}> ");
    match input.next_line().await {
        Ok(Some(line)) => Some(line.trim().to_owned()),
        _ => None,
    }
}

/// Anything with an `@` is an email, everything else a phone number.
fn split_contact(raw: &str) -> (Option<&str>, Option<&str>) {
    if raw.contains('@') {
        (Some(raw), None)
    } else {
        (None, Some(raw))
    }
}

fn describe(view: &PollerView) -> String {
    match (&view.status, view.urgency) {
        (Some(status), Some(urgency)) if status.otp_active => format!(
            "code valid for {}s ({urgency:?}), {} attempt(s) left",
            status.remaining_seconds, status.remaining_attempts
        ),
        (Some(_), _) => "code no longer valid, type `resend`".into(),
        _ => "no code sent yet".into(),
    }
}

fn report(failure: &Failure) {
    eprintln!("  ✗ {} [{}]", failure.message(), failure.code());
    if let Some(minutes) = failure.retry_after_minutes() {
        eprintln!("    try again in {minutes} minute(s)");
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

async fn verify_contact<T: Transport>(
    session: &SessionManager<T>,
    input: &mut Input,
) -> Option<()> {
    loop {
        let raw = prompt(input, "email or phone").await?;
        let (email, phone) = split_contact(&raw);
        match session.verify_contact(email, phone, None).await {
            Ok(reply) => {
                let name = reply.data.customer_name.unwrap_or_else(|| "customer".into());
                eprintln!("  ✓ hello {name}");
                return Some(());
            }
            Err(failure) => {
                report(&failure);
                let snapshot = session.snapshot();
                if snapshot.contact_attempts.is_exhausted()
                    || snapshot.state == Some(SessionState::Locked)
                {
                    return None;
                }
            }
        }
    }
}

async fn verify_otp(client: &AuthClient<HttpTransport>, input: &mut Input) -> Option<()> {
    let session = client.session();
    if let Err(failure) = session.initiate_otp().await {
        report(&failure);
    }

    loop {
        eprintln!("  {}", describe(&client.otp_view().borrow()));
        let raw = prompt(input, "code (or resend / restart)").await?;
        let outcome = match raw.as_str() {
            "resend" => session.resend_otp().await.map(|_| ()),
            "restart" => return None,
            code => session.verify_otp(code).await.map(|_| ()),
        };
        match outcome {
            Ok(()) if session.snapshot().is_authenticated() => return Some(()),
            Ok(()) => eprintln!("  ✓ new code sent"),
            Err(failure) => {
                report(&failure);
                if session.snapshot().state == Some(SessionState::Locked) {
                    return None;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("otpgate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let url = std::env::var("OTPGATE_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".into());
    let path = std::env::var("OTPGATE_STORE").unwrap_or_else(|_| "otpgate-session.json".into());
    eprintln!("talking to {url}, session kept in {path}");

    let client = AuthClient::builder()
        .base_url(url)
        .store(DurableStore::new(FileStorage::new(path)))
        .build()
        .await?;
    client.start().await;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let session = client.session();

    let done = loop {
        let resumable = session
            .snapshot()
            .state
            .is_some_and(|s| s == SessionState::OtpVerification);
        if !resumable {
            session.restart_session().await?;
            if let Some(id) = session.session_id() {
                eprintln!("  ✓ session {id}");
            }
            if verify_contact(session, &mut input).await.is_none() {
                if prompt(&mut input, "start over? [y/N]").await.as_deref() == Some("y") {
                    continue;
                }
                break false;
            }
        }
        match verify_otp(&client, &mut input).await {
            Some(()) => break true,
            None => {
                session.clear_session();
                if prompt(&mut input, "start over? [y/N]").await.as_deref() != Some("y") {
                    break false;
                }
            }
        }
    };

    if done {
        eprintln!("  ✓ authenticated");
    }
    client.shutdown().await;
    Ok(())
}
