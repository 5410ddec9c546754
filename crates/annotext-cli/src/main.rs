use annotext_config::Config;
use annotext_engine::{
    Annotation, AnnotationId, Block, BlockMetrics, DisplayMode, Document, ViewController,
};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block as Panel, Borders, List, ListItem, ListState, Paragraph},
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::{env, io::stdout, path::Path, path::PathBuf, process};

/// Sidecar annotation file: `<document>.ann.toml` next to the text file.
#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    #[serde(default, rename = "annotation")]
    annotations: Vec<SidecarAnnotation>,
}

#[derive(Debug, Deserialize)]
struct SidecarAnnotation {
    kind: String,
    start: usize,
    end: usize,
    #[serde(default)]
    attributes: std::collections::BTreeMap<String, String>,
}

fn load_sidecar(document_path: &Path, explicit: Option<&Path>) -> Result<Sidecar> {
    let sidecar_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let mut derived = document_path.as_os_str().to_owned();
            derived.push(".ann.toml");
            PathBuf::from(derived)
        }
    };
    if !sidecar_path.exists() {
        if explicit.is_some() {
            anyhow::bail!("annotation file {} not found", sidecar_path.display());
        }
        return Ok(Sidecar::default());
    }
    let content = std::fs::read_to_string(&sidecar_path)
        .with_context(|| format!("reading {}", sidecar_path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", sidecar_path.display()))
}

/// One terminal row of the rendered document.
struct Row {
    text: String,
    /// Set for text-block rows so the viewport stabilizer can find them.
    serial: Option<u64>,
}

/// Row-based geometry over the current render: every block is one row high
/// and the stabilizer's pixel units are rows.
struct RowMetrics {
    viewport_rows: i64,
    scroll: i64,
    tops: Vec<(u64, i64)>,
}

impl RowMetrics {
    fn new(rows: &[Row], scroll: i64, viewport_rows: i64) -> Self {
        Self {
            viewport_rows,
            scroll,
            tops: rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| row.serial.map(|s| (s, i as i64)))
                .collect(),
        }
    }
}

impl BlockMetrics for RowMetrics {
    fn viewport_height(&self) -> i64 {
        self.viewport_rows
    }
    fn scroll_offset(&self) -> i64 {
        self.scroll
    }
    fn set_scroll_offset(&mut self, offset: i64) {
        self.scroll = offset;
    }
    fn block_top(&self, serial: u64) -> Option<i64> {
        self.tops
            .iter()
            .find(|&&(s, _)| s == serial)
            .map(|&(_, top)| top)
    }
    fn block_height(&self, _serial: u64) -> Option<i64> {
        Some(1)
    }
}

struct App {
    controller: ViewController,
    kinds: Vec<String>,
    kind_list_state: ListState,
    rows: Vec<Row>,
    scroll: i64,
    viewport_rows: i64,
    folded_kinds: BTreeSet<String>,
}

impl App {
    fn new(document: Document, config: &Config) -> Self {
        let kinds: BTreeSet<String> = document
            .annotations()
            .iter()
            .map(|a| a.kind.clone())
            .chain(config.display_modes.keys().cloned())
            .collect();

        let mut controller = ViewController::with_config(document, config.stabilizer());
        for (kind, mode) in &config.display_modes {
            controller.set_display_mode(kind, *mode);
        }
        controller.reconcile();

        let mut app = Self {
            controller,
            kinds: kinds.into_iter().collect(),
            kind_list_state: ListState::default(),
            rows: Vec::new(),
            scroll: 0,
            viewport_rows: 24,
            folded_kinds: BTreeSet::new(),
        };
        if !app.kinds.is_empty() {
            app.kind_list_state.select(Some(0));
        }
        app.rows = app.render_rows();
        app
    }

    fn active_kind(&self) -> Option<&str> {
        self.kind_list_state
            .selected()
            .and_then(|i| self.kinds.get(i))
            .map(String::as_str)
    }

    fn next_kind(&mut self) {
        if self.kinds.is_empty() {
            return;
        }
        let i = match self.kind_list_state.selected() {
            Some(i) => (i + 1) % self.kinds.len(),
            None => 0,
        };
        self.kind_list_state.select(Some(i));
    }

    fn previous_kind(&mut self) {
        if self.kinds.is_empty() {
            return;
        }
        let i = match self.kind_list_state.selected() {
            Some(i) => {
                if i == 0 {
                    self.kinds.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.kind_list_state.select(Some(i));
    }

    /// Re-render after a layout change, keeping the stable line anchored.
    fn refresh_anchored(&mut self, change: impl FnOnce(&mut ViewController)) {
        let metrics = RowMetrics::new(&self.rows, self.scroll, self.viewport_rows);
        let anchor = self.controller.record_viewport(&metrics);

        change(&mut self.controller);
        self.controller.reconcile();
        self.rows = self.render_rows();

        let mut metrics = RowMetrics::new(&self.rows, self.scroll, self.viewport_rows);
        if let Some(anchor) = anchor {
            self.controller.restore_viewport(&anchor, &mut metrics);
        }
        self.scroll = metrics.scroll.clamp(0, self.max_scroll());
    }

    fn cycle_mode(&mut self) {
        let Some(kind) = self.active_kind().map(str::to_owned) else {
            return;
        };
        let next = match self.controller.display_mode(&kind) {
            DisplayMode::Invisible => DisplayMode::ShowHighlights,
            DisplayMode::ShowHighlights => DisplayMode::ShowTags,
            DisplayMode::ShowTags => DisplayMode::Invisible,
        };
        self.refresh_anchored(|c| c.set_display_mode(&kind, next));
    }

    fn toggle_fold(&mut self) {
        let Some(kind) = self.active_kind().map(str::to_owned) else {
            return;
        };
        if self.controller.display_mode(&kind) != DisplayMode::ShowTags {
            return;
        }
        let fold = !self.folded_kinds.contains(&kind);
        if fold {
            self.folded_kinds.insert(kind.clone());
        } else {
            self.folded_kinds.remove(&kind);
        }
        let ids: Vec<AnnotationId> = self
            .controller
            .document()
            .annotations()
            .of_kind(&kind)
            .map(|a| a.id)
            .collect();
        self.refresh_anchored(|c| {
            for id in ids {
                c.set_folded(id, fold);
            }
        });
    }

    fn scroll_by(&mut self, delta: i64) {
        self.scroll = (self.scroll + delta).clamp(0, self.max_scroll());
    }

    fn max_scroll(&self) -> i64 {
        (self.rows.len() as i64 - self.viewport_rows).max(0)
    }

    /// Flatten the arena's visual order into rows. Leaves under a folded
    /// container collapse to the container's start tag plus an ellipsis.
    fn render_rows(&self) -> Vec<Row> {
        let arena = self.controller.arena();
        let doc = self.controller.document();
        let mut rows = Vec::new();

        for &key in arena.visual_order() {
            let ancestors = arena.ancestors_of(key);
            let folded_ancestor = ancestors.iter().rev().find_map(|&a| match arena.get(a) {
                Some(Block::Container(c)) if c.folded => Some(c),
                _ => None,
            });
            if let Some(container) = folded_ancestor {
                if container.start_tag == key {
                    let depth = arena.ancestors_of(key).len().saturating_sub(1);
                    let text = arena.tag(key).map(|t| t.text.as_str()).unwrap_or("<>");
                    rows.push(Row {
                        text: format!("{}{} …", "  ".repeat(depth), text),
                        serial: None,
                    });
                }
                continue;
            }

            let depth = ancestors.len();
            match arena.get(key) {
                Some(Block::Text(b)) => {
                    if doc.has_break_before(b.token_range.start) && depth == 0 {
                        rows.push(Row {
                            text: String::new(),
                            serial: None,
                        });
                    }
                    rows.push(Row {
                        text: format!("{}{}", "  ".repeat(depth), b.rendered_text(doc)),
                        serial: Some(b.serial),
                    });
                }
                Some(Block::Tag(t)) => {
                    rows.push(Row {
                        text: format!("{}{}", "  ".repeat(depth.saturating_sub(1)), t.text),
                        serial: None,
                    });
                }
                _ => {}
            }
        }
        rows
    }
}

fn main() -> Result<()> {
    if env::var("ANNOTEXT_LOG").is_ok() {
        let log_file = std::fs::File::create("annotext.log")?;
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_env("ANNOTEXT_LOG"))
            .with_writer(log_file)
            .with_ansi(false)
            .init();
    }

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <text-file> [annotations.ann.toml]", args[0]);
        eprintln!("Without the second argument, <text-file>.ann.toml is used when present.");
        process::exit(1);
    }
    let document_path = PathBuf::from(&args[1]);
    let sidecar_arg = args.get(2).map(PathBuf::from);

    let config = match Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let text = std::fs::read_to_string(&document_path)
        .with_context(|| format!("reading {}", document_path.display()))?;
    let mut document = Document::from_text(&text);

    let sidecar = load_sidecar(&document_path, sidecar_arg.as_deref())?;
    for entry in sidecar.annotations {
        if entry.start >= entry.end || entry.end > document.token_count() {
            eprintln!(
                "Warning: skipping {} annotation with invalid range {}..{}",
                entry.kind, entry.start, entry.end
            );
            continue;
        }
        let mut annotation = Annotation::new(&entry.kind, entry.start..entry.end);
        for (name, value) in entry.attributes {
            annotation.set_attribute(name, value);
        }
        document.add_annotation(annotation)?;
    }
    tracing::info!(
        tokens = document.token_count(),
        annotations = document.annotations().len(),
        "loaded document"
    );

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(document, &config);

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    <B as ratatui::backend::Backend>::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Down | KeyCode::Char('j') => app.scroll_by(1),
                KeyCode::Up | KeyCode::Char('k') => app.scroll_by(-1),
                KeyCode::PageDown => app.scroll_by(app.viewport_rows),
                KeyCode::PageUp => app.scroll_by(-app.viewport_rows),
                KeyCode::Home => app.scroll = 0,
                KeyCode::End => app.scroll = app.max_scroll(),
                KeyCode::Tab => app.next_kind(),
                KeyCode::BackTab => app.previous_kind(),
                KeyCode::Char('m') | KeyCode::Enter => app.cycle_mode(),
                KeyCode::Char('f') => app.toggle_fold(),
                _ => {}
            }
        }
    }
}

fn mode_label(mode: DisplayMode) -> &'static str {
    match mode {
        DisplayMode::Invisible => "invisible",
        DisplayMode::ShowHighlights => "highlights",
        DisplayMode::ShowTags => "tags",
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(f.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(0)].as_ref())
        .split(outer[0]);

    app.viewport_rows = i64::from(chunks[1].height.saturating_sub(2));
    app.scroll = app.scroll.clamp(0, app.max_scroll());

    // Kind panel: one entry per annotation kind with its current mode.
    let kind_items: Vec<ListItem> = app
        .kinds
        .iter()
        .map(|kind| {
            let mode = app.controller.display_mode(kind);
            let folded = if app.folded_kinds.contains(kind) {
                " [folded]"
            } else {
                ""
            };
            ListItem::new(vec![Line::from(vec![Span::raw(format!(
                "{kind}: {}{folded}",
                mode_label(mode)
            ))])])
        })
        .collect();

    let kinds_list = List::new(kind_items)
        .block(Panel::default().borders(Borders::ALL).title("Kinds"))
        .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));

    f.render_stateful_widget(kinds_list, chunks[0], &mut app.kind_list_state);

    // Document panel.
    let lines: Vec<Line> = app
        .rows
        .iter()
        .map(|row| Line::from(vec![Span::raw(row.text.clone())]))
        .collect();

    let stats = app.controller.last_stats();
    let title = format!(
        "Document (built {}, reused {})",
        stats.text_blocks_built, stats.text_blocks_reused
    );
    let content = Paragraph::new(lines)
        .block(Panel::default().borders(Borders::ALL).title(title))
        .scroll((app.scroll.max(0) as u16, 0));

    f.render_widget(content, chunks[1]);

    let help = Paragraph::new(vec![Line::from(vec![Span::raw(
        "q: Quit | j/k: Scroll | Tab: Kind | m: Cycle mode | f: Fold tags",
    )])]);
    f.render_widget(help, outer[1]);
}
