use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};

use veilchat_client::{Client, ClientConfig, ClientEvent};
use veilchat_core::PeerIdentity;

const DEFAULT_SERVER: &str = "wss://127.0.0.1:8080";
const LOG_ROWS: usize = 10;

struct App {
    client: Client,
    peers: Vec<PeerIdentity>,
    selected: Option<String>,
    log: Vec<String>,
    input: String,
    status: String,
    last_draw: Instant,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().collect();

    let mut insecure = false;
    let mut server_url = DEFAULT_SERVER.to_string();
    let mut username = String::new();

    // Minimal arg parsing
    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--insecure-dev" => insecure = true,
            "--server" if i + 1 < argv.len() => {
                server_url = argv[i + 1].clone();
                i += 1;
            }
            "--name" if i + 1 < argv.len() => {
                username = argv[i + 1].clone();
                i += 1;
            }
            _ if username.is_empty() => username = argv[i].clone(),
            _ => {}
        }
        i += 1;
    }

    if username.is_empty() {
        eprintln!("usage: veilchat [--server URL] [--insecure-dev] <username>");
        return Ok(());
    }
    if server_url.starts_with("ws://") && !insecure {
        eprintln!("ERROR: ws:// is only allowed with --insecure-dev on localhost.");
        return Ok(());
    }

    let mut config = ClientConfig::new(server_url, username);
    if insecure {
        config = config.with_insecure_dev();
    }

    println!("Connecting to {}...", config.relay_url);
    let client = Client::connect(config).await?;

    let mut app = App {
        client,
        peers: Vec::new(),
        selected: None,
        log: Vec::new(),
        input: String::new(),
        status: "CONNECTED".to_string(),
        last_draw: Instant::now(),
    };
    if let Some(fp) = app.client.fingerprint() {
        app.log.push(format!("Your key fingerprint: {}", fp));
    }
    app.log
        .push("Tab selects a peer, Enter sends, Esc quits.".to_string());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), cursor::Hide)?;

    let result = app.run().await;

    disable_raw_mode()?;
    execute!(stdout, cursor::Show)?;
    println!("\nSession ended.");
    result
}

impl App {
    async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            if Instant::now().duration_since(self.last_draw) > Duration::from_millis(50) {
                self.draw()?;
                self.last_draw = Instant::now();
            }

            tokio::select! {
                event = self.client.next_event() => {
                    match event {
                        Ok(event) => self.handle_client_event(event),
                        Err(e) => {
                            // Connection loss is terminal: every session key
                            // died with the context. Reconnect = re-register.
                            self.status = "DISCONNECTED".to_string();
                            self.log.push(format!("Disconnected: {}", e));
                            self.draw()?;
                            return Ok(());
                        }
                    }
                }
                key = tokio::task::spawn_blocking(|| event::poll(Duration::from_millis(10))) => {
                    if matches!(key, Ok(Ok(true))) {
                        if let Event::Key(key) = event::read()? {
                            if self.handle_key(key.code).await? {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::PeerList(peers) => {
                self.peers = peers;
                // Selection survives only if the peer is still present.
                if let Some(ref id) = self.selected {
                    if !self.peers.iter().any(|p| &p.id == id) {
                        self.selected = None;
                    }
                }
            }
            ClientEvent::Message { from, text, .. } => {
                let name = self.peer_name(&from);
                self.log.push(format!("{}: {}", name, text));
            }
            ClientEvent::DecryptFailed { from } => {
                let name = self.peer_name(&from);
                self.log
                    .push(format!("{}: <unable to decrypt message>", name));
            }
            ClientEvent::KeyInstalled { from } => {
                let name = self.peer_name(&from);
                self.log.push(format!("Secure session established with {}", name));
            }
            ClientEvent::ExchangeFailed { from } => {
                let name = self.peer_name(&from);
                self.log.push(format!("Key exchange from {} failed", name));
            }
        }
    }

    /// Returns true when the app should quit.
    async fn handle_key(&mut self, code: KeyCode) -> Result<bool, Box<dyn std::error::Error>> {
        match code {
            KeyCode::Esc => return Ok(true),
            KeyCode::Tab => self.cycle_selection(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Enter => {
                if self.input.is_empty() {
                    return Ok(false);
                }
                let Some(peer_id) = self.selected.clone() else {
                    self.log.push("No peer selected (Tab to choose).".to_string());
                    return Ok(false);
                };
                let text = std::mem::take(&mut self.input);
                match self.client.send_to(&peer_id, &text).await {
                    Ok(()) => {
                        let name = self.peer_name(&peer_id);
                        self.log.push(format!("You -> {}: {}", name, text));
                    }
                    Err(e) => self.log.push(format!("Send failed: {}", e)),
                }
            }
            _ => {}
        }
        Ok(false)
    }

    /// Advance selection to the next peer that isn't us.
    fn cycle_selection(&mut self) {
        let local_id = self.client.local_id().to_string();
        let others: Vec<&PeerIdentity> =
            self.peers.iter().filter(|p| p.id != local_id).collect();
        if others.is_empty() {
            self.selected = None;
            return;
        }
        let next = match self.selected.as_deref() {
            Some(current) => {
                let pos = others.iter().position(|p| p.id == current);
                match pos {
                    Some(i) => others[(i + 1) % others.len()],
                    None => others[0],
                }
            }
            None => others[0],
        };
        self.selected = Some(next.id.clone());
    }

    fn peer_name(&self, peer_id: &str) -> String {
        self.peers
            .iter()
            .find(|p| p.id == peer_id)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| peer_id.to_string())
    }

    fn draw(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, cursor::MoveTo(0, 0))?;

        println!(
            "VeilChat | {} | Status: {}",
            self.client.username(),
            self.status
        );

        // Peer row: everyone online, selection marked, us tagged.
        execute!(stdout, cursor::MoveTo(0, 1))?;
        execute!(stdout, Clear(ClearType::CurrentLine))?;
        let local_id = self.client.local_id();
        let peers: Vec<String> = self
            .peers
            .iter()
            .map(|p| {
                if p.id == local_id {
                    format!("{} (you)", p.username)
                } else if Some(p.id.as_str()) == self.selected.as_deref() {
                    format!("[{}]", p.username)
                } else if self.client.has_session_key(&p.id) {
                    format!("{}*", p.username)
                } else {
                    p.username.clone()
                }
            })
            .collect();
        println!("Online: {}", peers.join("  "));
        println!("{}", "=".repeat(60));

        for i in 0..LOG_ROWS {
            execute!(stdout, cursor::MoveTo(0, 3 + i as u16))?;
            execute!(stdout, Clear(ClearType::CurrentLine))?;
            if let Some(line) = self.log.get(self.log.len().saturating_sub(LOG_ROWS) + i) {
                println!("{}", line);
            }
        }

        execute!(stdout, cursor::MoveTo(0, 3 + LOG_ROWS as u16))?;
        println!("{}", "-".repeat(60));
        execute!(stdout, Clear(ClearType::CurrentLine))?;
        print!("> {}", self.input);
        stdout.flush()?;
        Ok(())
    }
}
