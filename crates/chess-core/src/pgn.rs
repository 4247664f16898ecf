//! PGN export of a played session.

use crate::game_data::GameResult;
use crate::rules::STANDARD_START_FEN;

/// Header values written at the top of an exported game.
#[derive(Debug, Clone, Default)]
pub struct PgnHeaders {
    pub event: Option<String>,
    pub white: String,
    pub black: String,
    pub date: Option<String>,
    pub time_control: Option<String>,
    /// Starting FEN when the game did not begin from the standard position.
    pub start_fen: Option<String>,
}

/// Render SAN moves as numbered movetext: `1. e4 e5 2. Nf3`.
pub fn movetext(sans: &[String]) -> String {
    let mut out = String::new();
    for (i, san) in sans.iter().enumerate() {
        if i % 2 == 0 {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("{}. {}", i / 2 + 1, san));
        } else {
            out.push_str(&format!(" {san}"));
        }
    }
    out
}

/// Render a full PGN document.
pub fn render_pgn(headers: &PgnHeaders, sans: &[String], result: Option<GameResult>) -> String {
    let token = GameResult::pgn_token(result);
    let mut out = String::new();

    let mut tag = |key: &str, value: &str| {
        out.push_str(&format!("[{key} \"{}\"]\n", value.replace('"', "'")));
    };
    tag("Event", headers.event.as_deref().unwrap_or("Casual game"));
    tag("Date", headers.date.as_deref().unwrap_or("????.??.??"));
    tag("White", &headers.white);
    tag("Black", &headers.black);
    tag("Result", token);
    if let Some(tc) = &headers.time_control {
        tag("TimeControl", tc);
    }
    if let Some(fen) = headers.start_fen.as_deref().filter(|f| *f != STANDARD_START_FEN) {
        tag("SetUp", "1");
        tag("FEN", fen);
    }

    out.push('\n');
    let body = movetext(sans);
    if body.is_empty() {
        out.push_str(token);
    } else {
        out.push_str(&format!("{body} {token}"));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::Side;

    #[test]
    fn test_movetext_numbering() {
        let sans: Vec<String> = ["e4", "e5", "Nf3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(movetext(&sans), "1. e4 e5 2. Nf3");
        assert_eq!(movetext(&[]), "");
    }

    #[test]
    fn test_render_full_game() {
        let headers = PgnHeaders {
            white: "Player1".into(),
            black: "Player2".into(),
            time_control: Some("600".into()),
            ..Default::default()
        };
        let sans: Vec<String> = ["f3", "e5", "g4", "Qh4#"].iter().map(|s| s.to_string()).collect();
        let pgn = render_pgn(&headers, &sans, Some(GameResult::Winner(Side::Black)));

        assert!(pgn.contains("[White \"Player1\"]"));
        assert!(pgn.contains("[Result \"0-1\"]"));
        assert!(pgn.trim_end().ends_with("2. g4 Qh4# 0-1"));
        assert!(!pgn.contains("[SetUp"));
    }

    #[test]
    fn test_custom_start_writes_fen_tags() {
        let fen = "8/4P1k1/8/8/8/8/8/4K3 w - - 0 1";
        let headers = PgnHeaders {
            white: "a".into(),
            black: "b".into(),
            start_fen: Some(fen.into()),
            ..Default::default()
        };
        let pgn = render_pgn(&headers, &["e8=Q".to_string()], None);
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains(&format!("[FEN \"{fen}\"]")));

        let standard = PgnHeaders {
            start_fen: Some(STANDARD_START_FEN.into()),
            ..headers
        };
        assert!(!render_pgn(&standard, &[], None).contains("[FEN"));
    }
}
