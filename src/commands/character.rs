use anyhow::Result;

use crate::commands::{CommandReport, Workspace};
use crate::companion::character::Character;

pub fn run() -> Result<CommandReport> {
    let ws = Workspace::load()?;
    let mut report = CommandReport::new("character");
    let source = if ws.paths.character_file.exists() {
        ws.paths.character_file.display().to_string()
    } else {
        "built-in".to_string()
    };
    let character = Character::load_or_default(&ws.paths.character_file)?;

    println!("{}", character.system_prompt());
    report.stdout_claimed = true;
    report.detail(format!("name={}", character.name));
    report.detail(format!("profile={source}"));
    Ok(report)
}
