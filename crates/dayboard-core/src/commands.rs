use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::board::{Board, Position};
use crate::calendar::{self, CalendarCursor};
use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::{DataStore, LoadedState};
use crate::datetime;
use crate::reconcile;
use crate::render::Renderer;
use crate::theme::Theme;

/// Local image files above this size are refused rather than inlined.
const MAX_BACKGROUND_FILE_BYTES: u64 = 5 * 1024 * 1024;

const CALENDAR_PREVIEW_LIMIT: usize = 3;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "background",
        "board",
        "calendar",
        "columns",
        "drop",
        "edit",
        "help",
        "layout",
        "move",
        "remove",
        "rename",
        "select",
        "theme",
        "toggle",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();

    debug!(
        command = %inv.command,
        args = ?inv.args,
        "dispatching command"
    );

    match inv.command.as_str() {
        "board" => cmd_board(store, renderer, now),
        "calendar" => cmd_calendar(store, renderer, &inv.args, now),
        "add" => cmd_add(store, &inv.args, now),
        "toggle" => cmd_toggle(store, &inv.args, now),
        "remove" => cmd_remove(store, &inv.args, now),
        "edit" => cmd_edit(store, &inv.args, now),
        "move" => cmd_move(store, &inv.args, now),
        "select" => cmd_select(store, &inv.args, now),
        "columns" => cmd_columns(store, now),
        "rename" => cmd_rename(store, &inv.args, now),
        "drop" => cmd_drop(store, &inv.args, now),
        "layout" => cmd_layout(store, now),
        "background" => cmd_background(store, &inv.args, now),
        "theme" => cmd_theme(store, cfg, &inv.args),
        "help" => cmd_help(),
        "version" => {
            println!("dayboard {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unhandled command: {other}")),
    }
}

/// Every command starts from the same place: load the snapshot and run the
/// daily expiry. Expired (or freshly seeded) state is persisted right away
/// so repeated invocations agree with each other.
fn load_current(store: &DataStore, now: DateTime<Utc>) -> anyhow::Result<LoadedState> {
    let mut state = store.load(now);
    let dropped = state.board.expire_stale(datetime::today(now));
    if dropped > 0 || state.seeded {
        info!(dropped, seeded = state.seeded, "persisting post-load state");
        store.save(&state.board, &state.backgrounds)?;
    }
    Ok(state)
}

#[instrument(skip(store, renderer, now))]
fn cmd_board(store: &DataStore, renderer: &mut Renderer, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command board");
    let state = load_current(store, now)?;
    let snapshot = state.board.snapshot(now);
    renderer.print_board(&snapshot, state.backgrounds.get(state.board.selected_date()))
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_calendar(
    store: &DataStore,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command calendar");

    let delta: i32 = match args.first() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid month offset: {raw}"))?,
        None => 0,
    };

    let state = load_current(store, now)?;
    let today = datetime::today(now);
    let mut cursor = CalendarCursor::current(today);
    cursor.shift(delta);

    let counts =
        calendar::count_tasks_by_date(state.board.tasks(), cursor.year, cursor.month, today);
    renderer.print_calendar(
        cursor,
        &counts,
        &state.backgrounds,
        state.board.selected_date(),
        today,
    )?;

    let preview = calendar::day_preview(
        state.board.tasks(),
        state.board.selected_date(),
        CALENDAR_PREVIEW_LIMIT,
    );
    if !preview.is_empty() {
        println!();
        println!("{}:", state.board.selected_date());
        for text in preview {
            println!("  - {text}");
        }
    }
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_add(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");

    let mut text_parts: Vec<&str> = Vec::new();
    let mut due_time = None;
    let mut column_token: Option<&str> = None;
    for arg in args {
        if let Some(raw) = arg.strip_prefix("at:") {
            due_time = Some(
                datetime::parse_time_of_day(raw)
                    .ok_or_else(|| anyhow!("invalid time of day: {raw}"))?,
            );
        } else if let Some(raw) = arg.strip_prefix("col:") {
            column_token = Some(raw);
        } else {
            text_parts.push(arg);
        }
    }
    let text = text_parts.join(" ");

    let mut state = load_current(store, now)?;
    let column_id = column_token
        .map(|token| resolve_column(&state.board, token))
        .transpose()?;

    let created = state
        .board
        .add_task(&text, column_id, due_time, now)
        .map(|task| task.id);
    store.save(&state.board, &state.backgrounds)?;

    match created {
        Some(id) => println!("Created task {}.", short_id(id)),
        None => println!("Nothing to add."),
    }
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_toggle(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command toggle");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("toggle requires a task id"))?;
    let mut state = load_current(store, now)?;
    let id = resolve_task(&state.board, token)?;

    state.board.toggle_task(id);
    store.save(&state.board, &state.backgrounds)?;

    let completed = state.board.task(id).map(|t| t.completed).unwrap_or(false);
    if completed {
        println!("Completed task {}.", short_id(id));
    } else {
        println!("Reopened task {}.", short_id(id));
    }
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_remove(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command remove");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("remove requires a task id"))?;
    let mut state = load_current(store, now)?;
    let id = resolve_task(&state.board, token)?;

    state.board.remove_task(id);
    store.save(&state.board, &state.backgrounds)?;

    println!("Removed task {}.", short_id(id));
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_edit(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command edit");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("edit requires a task id"))?;
    if args.len() < 2 {
        return Err(anyhow!("edit requires replacement text"));
    }
    let new_text = args[1..].join(" ");

    let mut state = load_current(store, now)?;
    let id = resolve_task(&state.board, token)?;

    state.board.update_task(id, &new_text);
    store.save(&state.board, &state.backgrounds)?;

    println!("Updated task {}.", short_id(id));
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_move(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command move");

    let task_token = args
        .first()
        .ok_or_else(|| anyhow!("move requires a task id"))?;
    let column_token = args
        .get(1)
        .ok_or_else(|| anyhow!("move requires a destination column"))?;
    let position = match args.get(2).map(String::as_str) {
        None | Some("head") => Position::Head,
        Some("tail") => Position::Tail,
        Some(other) => return Err(anyhow!("unknown position: {other}")),
    };

    let mut state = load_current(store, now)?;
    let task_id = resolve_task(&state.board, task_token)?;
    let column_id = resolve_column(&state.board, column_token)?;

    state.board.move_task_to_column(task_id, column_id, position);
    store.save(&state.board, &state.backgrounds)?;

    println!("Moved task {}.", short_id(task_id));
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_select(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command select");

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("select requires a YYYY-MM-DD date"))?;
    let date = raw
        .parse::<NaiveDate>()
        .with_context(|| format!("invalid date: {raw}"))?;

    let mut state = load_current(store, now)?;
    state.board.select_date(date);
    store.save(&state.board, &state.backgrounds)?;

    println!("Selected {date}.");
    Ok(())
}

#[instrument(skip(store, now))]
fn cmd_columns(store: &DataStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command columns");

    let state = load_current(store, now)?;
    for col in state.board.columns() {
        println!(
            "{}  {:<16} {} task{}",
            short_id(col.id),
            col.name,
            col.task_ids.len(),
            if col.task_ids.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_rename(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command rename");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("rename requires a column"))?;
    if args.len() < 2 {
        return Err(anyhow!("rename requires a new name"));
    }
    let new_name = args[1..].join(" ");

    let mut state = load_current(store, now)?;
    let id = resolve_column(&state.board, token)?;

    state.board.rename_column(id, &new_name);
    store.save(&state.board, &state.backgrounds)?;

    let name = state
        .board
        .column(id)
        .map(|c| c.name.clone())
        .unwrap_or_default();
    println!("Column {} is now \"{name}\".", short_id(id));
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_drop(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command drop");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("drop requires a column"))?;
    let mut state = load_current(store, now)?;
    let id = resolve_column(&state.board, token)?;

    state.board.remove_column(id);
    store.save(&state.board, &state.backgrounds)?;

    println!("Dropped column {}.", short_id(id));
    Ok(())
}

/// Reads a `{ "column": ["task-id", ...] }` JSON object from stdin, the
/// shape a drag layer reports after a completed drag, and reconciles the
/// store against it.
#[instrument(skip(store, now))]
fn cmd_layout(store: &DataStore, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command layout");

    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("failed reading layout from stdin")?;
    let report: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw)
        .context("layout must be a JSON object of column -> task id arrays")?;

    let mut state = load_current(store, now)?;
    let orderings = reconcile::orderings_from_raw(&state.board, &report);
    state.board.reconcile(&orderings);
    store.save(&state.board, &state.backgrounds)?;

    println!(
        "Applied layout for {} column{}.",
        orderings.len(),
        if orderings.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

#[instrument(skip(store, args, now))]
fn cmd_background(store: &DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command background");

    let mut state = load_current(store, now)?;
    let date = state.board.selected_date();

    match args.first().map(String::as_str) {
        None => {
            match state.backgrounds.get(date) {
                Some(reference) => println!("{date}: {} byte reference", reference.len()),
                None => println!("No background for {date}."),
            }
            Ok(())
        }
        Some("set") => {
            let raw = args
                .get(1)
                .ok_or_else(|| anyhow!("background set requires a file or reference"))?;
            let reference = inline_reference(raw)?;
            state.backgrounds.set(date, reference);
            store.save(&state.board, &state.backgrounds)?;
            println!("Background set for {date}.");
            Ok(())
        }
        Some("clear") => {
            state.backgrounds.clear(date);
            store.save(&state.board, &state.backgrounds)?;
            println!("Background cleared for {date}.");
            Ok(())
        }
        Some(other) => Err(anyhow!("unknown background action: {other}")),
    }
}

#[instrument(skip(store, cfg, args))]
fn cmd_theme(store: &DataStore, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    info!("command theme");

    match args.first() {
        Some(raw) => {
            let theme = Theme::parse(raw).ok_or_else(|| anyhow!("unknown theme: {raw}"))?;
            store.save_theme(theme)?;
            println!("Theme set to {}.", theme.as_str());
        }
        None => {
            let theme = store
                .load_theme()
                .or_else(|| cfg.get("theme.default").and_then(|raw| Theme::parse(&raw)))
                .unwrap_or_default();
            println!("{}", theme.as_str());
        }
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("dayboard commands:");
    println!("  board                      show the board for the selected date");
    println!("  calendar [delta]           month view, shifted by signed months");
    println!("  add <text> [at:HH:MM] [col:<column>]");
    println!("  toggle <task>              complete or reopen a task");
    println!("  remove <task>");
    println!("  edit <task> <text>");
    println!("  move <task> <column> [head|tail]");
    println!("  select <YYYY-MM-DD>        change the selected date");
    println!("  columns                    list columns");
    println!("  rename <column> <name>");
    println!("  drop <column>              delete a column, rehoming its tasks");
    println!("  layout                     apply a drag report from stdin");
    println!("  background [set <ref> | clear]");
    println!("  theme [light|dark]");
    println!("Commands may be abbreviated to any unique prefix.");
    Ok(())
}

/// Local image files are inlined as data URLs so the stored reference
/// stays self-contained; anything else is stored verbatim.
fn inline_reference(raw: &str) -> anyhow::Result<String> {
    let path = Path::new(raw);
    if !path.is_file() {
        return Ok(raw.to_string());
    }

    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => return Err(anyhow!("not an image file: {raw}")),
    };

    let meta = fs::metadata(path).with_context(|| format!("failed to stat {raw}"))?;
    if meta.len() > MAX_BACKGROUND_FILE_BYTES {
        return Err(anyhow!("image exceeds the 5 MiB limit: {raw}"));
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {raw}"))?;
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

/// Unique-prefix task lookup against the unhyphenated id form, the same
/// shape the renderer prints.
fn resolve_task(board: &Board, token: &str) -> anyhow::Result<Uuid> {
    let needle: String = token
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_ascii_lowercase();
    if needle.is_empty() {
        return Err(anyhow!("empty task id"));
    }

    let mut matches = board
        .tasks()
        .iter()
        .filter(|t| t.id.simple().to_string().starts_with(&needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no task matches id: {token}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("task id is ambiguous: {token}"));
    }
    Ok(first.id)
}

fn resolve_column(board: &Board, token: &str) -> anyhow::Result<Uuid> {
    board
        .resolve_column_key(token)
        .ok_or_else(|| anyhow!("no unique column matches: {token}"))
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::{expand_command_abbrev, known_command_names};

    #[test]
    fn abbreviations_expand_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("boa", &known), Some("board"));
        assert_eq!(expand_command_abbrev("lay", &known), Some("layout"));
        assert_eq!(expand_command_abbrev("version", &known), Some("version"));
        // "b" could be board or background
        assert_eq!(expand_command_abbrev("b", &known), None);
        assert_eq!(expand_command_abbrev("nope", &known), None);
    }
}
