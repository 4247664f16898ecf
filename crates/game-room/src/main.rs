use game_room::clients::{HttpGameApi, WsLiveChannel};
use game_room::config::RoomConfig;
use game_room::runner::{self, Command};
use game_room::{GameRoom, RoomView};

use chess_core::{MoveRequest, ShakmatyRules};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RoomConfig::from_env()?;
    tracing::info!(game_id = %config.game_id, user_id = config.user_id, "Starting game room");

    let api = HttpGameApi::new(&config)?;
    let (live, live_inputs) = WsLiveChannel::spawn(
        config.live_url.clone(),
        config.auth_token.clone(),
        config.reconnect_backoff,
    );
    let room = GameRoom::new(ShakmatyRules, config.user_id, config.timings);
    let mut handle = runner::spawn(room, config.game_id.clone(), api, live, live_inputs);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown_moves = 0usize;
    let mut shown_status = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    handle.commands.send(Command::Leave).await.ok();
                    break;
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "quit" | "exit" => {
                        handle.commands.send(Command::Leave).await.ok();
                        break;
                    }
                    "pgn" => {
                        let (tx, rx) = oneshot::channel();
                        handle.commands.send(Command::ExportPgn(tx)).await?;
                        match rx.await? {
                            Some(pgn) => println!("{pgn}"),
                            None => println!("no game loaded"),
                        }
                    }
                    mv => match MoveRequest::parse_coordinates(mv) {
                        Some(request) => {
                            handle.commands.send(Command::Move(request)).await?;
                        }
                        None => println!("enter moves as e2e4 (e7e8q to promote), pgn, or quit"),
                    },
                }
            }
            Some(notice) = handle.notices.recv() => {
                println!("{}", serde_json::to_string(&notice)?);
            }
            changed = handle.views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = handle.views.borrow_and_update().clone();
                if view.moves.len() != shown_moves || view.status != shown_status {
                    shown_moves = view.moves.len();
                    shown_status = view.status;
                    print_board(&view);
                }
            }
        }
    }

    (&mut handle.task).await.ok();
    Ok(())
}

fn print_board(view: &RoomView) {
    let Some(perspective) = &view.perspective else {
        if let Some(reason) = &view.fatal {
            println!("cannot show game: {reason}");
        }
        return;
    };
    let clocks = view.seat_clocks;
    let top = perspective.top();
    println!(
        "{} ({}) {}",
        top.name,
        top.side,
        clocks.map(|c| format_clock(c.opponent)).unwrap_or_default()
    );
    println!("  {}", view.position.as_deref().unwrap_or("-"));
    let bottom = perspective.bottom();
    println!(
        "{} ({}) {}",
        bottom.name,
        bottom.side,
        clocks.map(|c| format_clock(c.mine)).unwrap_or_default()
    );
    let sans: Vec<String> = view.moves.iter().map(|m| m.san.clone()).collect();
    println!("  {}", chess_core::pgn::movetext(&sans));
    if let Some(result) = view.result {
        println!("  game over: {}", chess_core::GameResult::pgn_token(Some(result)));
    } else if view.is_my_turn {
        println!("  your move");
    }
}

fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
