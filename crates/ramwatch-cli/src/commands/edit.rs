//! Set, move and rotate command implementations.
//!
//! Every command here pauses the emulator once for all of its writes.

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use ramwatch_core::{ResolvePolicy, Rotation, Session};
use tracing::info;

use super::hex_utils::parse_assignment;

/// Run the set command
pub fn set(session: &Session, name: &str, value: &str) -> Result<()> {
    let count = session.resolve(name)?.len();
    if count == 0 {
        bail!("{} has no live instances", name);
    }
    if !session.set(name, value)? {
        bail!("Failed to write '{}' to {}", value, name);
    }

    info!("Set {} = {} ({} instances)", name, value, count);
    println!("{} = {}", name, session.get(name)?.join(", ").green());
    Ok(())
}

/// Parse `name=delta` arguments
pub fn parse_moves(moves: &[String]) -> Result<Vec<(String, f64)>> {
    moves
        .iter()
        .map(|arg| {
            let (name, delta) = parse_assignment(arg)?;
            let delta: f64 = delta
                .parse()
                .with_context(|| format!("Invalid delta in '{}'", arg))?;
            Ok((name, delta))
        })
        .collect()
}

/// Run the move command
pub fn translate(session: &Session, moves: &[String], policy: ResolvePolicy) -> Result<()> {
    let moves = parse_moves(moves)?;
    for (name, _) in &moves {
        session.variable(name)?;
    }

    let steps: Vec<(&str, f64)> = moves.iter().map(|(n, d)| (n.as_str(), *d)).collect();
    if !session.translate(&steps, policy)? {
        bail!("Some variables could not be moved");
    }

    for (name, _) in &moves {
        println!("{} = {}", name, session.get(name)?.join(", ").green());
    }
    Ok(())
}

/// Run the rotate command
pub fn rotate(session: &Session, tag: &str, rotation: Rotation, policy: ResolvePolicy) -> Result<()> {
    let count = session.snapshot().get(tag).len();
    if count == 0 {
        bail!("No live bases under '{}'", tag);
    }
    if !session.rotate_about_centroid(tag, rotation, policy)? {
        bail!("Some objects under '{}' could not be rotated", tag);
    }

    println!(
        "Rotated {} objects under {} by yaw {}, pitch {}, roll {}",
        count,
        tag.bold(),
        rotation.yaw,
        rotation.pitch,
        rotation.roll
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_moves() {
        let moves = parse_moves(&["Mario X=100".to_string(), "Mario Z=-2.5".to_string()]).unwrap();
        assert_eq!(moves, vec![("Mario X".to_string(), 100.0), ("Mario Z".to_string(), -2.5)]);
    }

    #[test]
    fn test_parse_moves_rejects_bad_delta() {
        assert!(parse_moves(&["Mario X=far".to_string()]).is_err());
        assert!(parse_moves(&["Mario X".to_string()]).is_err());
    }
}
