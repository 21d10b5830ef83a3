use crate::text::is_valid_lookup_text;
use crate::types::WordRecord;
use tracing::debug;

pub const PANEL_WIDTH: f64 = 352.0;
pub const PANEL_HEIGHT: f64 = 420.0;
/// During a drag only the title bar must stay reachable, so the vertical
/// clamp loosens to this strip.
pub const PANEL_DRAG_STRIP: f64 = 80.0;
pub const EDGE_MARGIN: f64 = 8.0;
pub const ANCHOR_GAP: f64 = 10.0;
/// Pointer-down inside our own root suppresses selection sampling for
/// this long, so panel clicks never masquerade as page selections.
pub const SELECTION_SUPPRESS_MS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Where the current query came from on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionAnchor {
    pub text: String,
    pub rect: Rect,
    pub context_sentence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragState {
    origin: Point,
    start: Position,
}

/// The whole interaction state in one container. All change goes
/// through [`reduce`]; callers perform the returned effects and feed
/// outcomes back in as events.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub visible: bool,
    pub loading: bool,
    pub anchor: Option<SelectionAnchor>,
    pub query: Option<String>,
    pub word_data: Option<WordRecord>,
    pub favorited: bool,
    pub panel_position: Option<Position>,
    pub menu_open: bool,
    pub flash_text: Option<String>,
    /// Bumped on every lookup dispatch; responses carrying an older
    /// value are discarded.
    pub generation: u64,
    suppress_selection_until: u64,
    drag: Option<DragState>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    PointerDownInRoot {
        now: u64,
    },
    /// A normalized selection sample from the page.
    SelectionSampled {
        text: String,
        rect: Rect,
        context_sentence: Option<String>,
        in_editable: bool,
        now: u64,
    },
    /// Click on an existing highlight marker.
    MarkClicked {
        word: String,
        rect: Rect,
        context_sentence: Option<String>,
    },
    LookupRequested,
    LookupResolved {
        generation: u64,
        record: WordRecord,
        favorited: bool,
    },
    LookupFailed {
        generation: u64,
    },
    FavoriteChanged {
        favorited: bool,
    },
    MenuToggled,
    Flash {
        message: String,
    },
    FlashExpired {
        message: String,
    },
    DragStarted {
        pointer: Point,
        viewport: Viewport,
    },
    DragMoved {
        pointer: Point,
        viewport: Viewport,
    },
    DragEnded,
    Dismissed,
}

/// Work the caller must carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Lookup {
        generation: u64,
        query: String,
        context_sentence: Option<String>,
    },
    ScheduleFlashExpiry {
        message: String,
    },
    RefreshHighlights,
}

/// Pure transition function: applies one event to the state and returns
/// the effects it implies. No I/O happens here.
pub fn reduce(state: &mut UiState, event: UiEvent) -> Vec<Effect> {
    match event {
        UiEvent::PointerDownInRoot { now } => {
            state.suppress_selection_until = now + SELECTION_SUPPRESS_MS;
            Vec::new()
        }
        UiEvent::SelectionSampled {
            text,
            rect,
            context_sentence,
            in_editable,
            now,
        } => {
            if now < state.suppress_selection_until || in_editable {
                return Vec::new();
            }
            if !is_valid_lookup_text(&text) {
                return Vec::new();
            }
            state.anchor = Some(SelectionAnchor {
                text: text.clone(),
                rect,
                context_sentence,
            });
            state.query = Some(text);
            state.visible = true;
            state.word_data = None;
            state.panel_position = None;
            state.menu_open = false;
            state.flash_text = None;
            Vec::new()
        }
        UiEvent::MarkClicked {
            word,
            rect,
            context_sentence,
        } => {
            state.anchor = Some(SelectionAnchor {
                text: word.clone(),
                rect,
                context_sentence,
            });
            state.query = Some(word);
            state.visible = true;
            state.panel_position = None;
            start_lookup(state)
        }
        UiEvent::LookupRequested => start_lookup(state),
        UiEvent::LookupResolved {
            generation,
            record,
            favorited,
        } => {
            if generation != state.generation {
                debug!(
                    stale = generation,
                    current = state.generation,
                    "discarding stale lookup response"
                );
                return Vec::new();
            }
            state.loading = false;
            state.word_data = Some(record);
            state.favorited = favorited;
            Vec::new()
        }
        UiEvent::LookupFailed { generation } => {
            if generation != state.generation {
                return Vec::new();
            }
            state.loading = false;
            state.word_data = Some(failed_lookup_record(
                state.query.as_deref().unwrap_or_default(),
            ));
            Vec::new()
        }
        UiEvent::FavoriteChanged { favorited } => {
            state.favorited = favorited;
            state.menu_open = false;
            vec![Effect::RefreshHighlights]
        }
        UiEvent::MenuToggled => {
            state.menu_open = !state.menu_open;
            Vec::new()
        }
        UiEvent::Flash { message } => {
            state.flash_text = Some(message.clone());
            state.menu_open = false;
            vec![Effect::ScheduleFlashExpiry { message }]
        }
        UiEvent::FlashExpired { message } => {
            if state.flash_text.as_deref() == Some(message.as_str()) {
                state.flash_text = None;
            }
            Vec::new()
        }
        UiEvent::DragStarted { pointer, viewport } => {
            let Some(anchor) = &state.anchor else {
                return Vec::new();
            };
            let start = state
                .panel_position
                .unwrap_or_else(|| default_panel_position(anchor.rect, viewport));
            state.drag = Some(DragState {
                origin: pointer,
                start,
            });
            Vec::new()
        }
        UiEvent::DragMoved { pointer, viewport } => {
            let Some(drag) = state.drag else {
                return Vec::new();
            };
            state.panel_position = Some(clamp_drag_position(drag.start, drag.origin, pointer, viewport));
            Vec::new()
        }
        UiEvent::DragEnded => {
            state.drag = None;
            Vec::new()
        }
        UiEvent::Dismissed => {
            state.visible = false;
            state.anchor = None;
            state.word_data = None;
            state.loading = false;
            state.panel_position = None;
            state.menu_open = false;
            state.flash_text = None;
            state.drag = None;
            Vec::new()
        }
    }
}

fn start_lookup(state: &mut UiState) -> Vec<Effect> {
    let Some(query) = state.query.clone().filter(|q| !q.is_empty()) else {
        return Vec::new();
    };
    state.generation += 1;
    state.loading = true;
    state.word_data = None;
    vec![Effect::Lookup {
        generation: state.generation,
        query,
        context_sentence: state
            .anchor
            .as_ref()
            .and_then(|a| a.context_sentence.clone()),
    }]
}

fn failed_lookup_record(word: &str) -> WordRecord {
    let mut record = WordRecord::new(word);
    record.translation_zh = Some("查询失败，请稍后重试。".to_string());
    record.definitions.push(crate::types::DefinitionItem::new(
        "unknown",
        "查询失败，请稍后重试。",
    ));
    record
}

/// Initial panel placement: below the anchor, kept inside the viewport.
pub fn default_panel_position(anchor: Rect, viewport: Viewport) -> Position {
    Position {
        left: (viewport.width - PANEL_WIDTH).min(anchor.left.max(EDGE_MARGIN)),
        top: (viewport.height - PANEL_HEIGHT).min((anchor.bottom + ANCHOR_GAP).max(EDGE_MARGIN)),
    }
}

/// Panel position while dragging, clamped so the title bar stays on
/// screen.
pub fn clamp_drag_position(
    start: Position,
    origin: Point,
    pointer: Point,
    viewport: Viewport,
) -> Position {
    let next_left = start.left + (pointer.x - origin.x);
    let next_top = start.top + (pointer.y - origin.y);
    Position {
        left: (viewport.width - PANEL_WIDTH).min(next_left.max(EDGE_MARGIN)),
        top: (viewport.height - PANEL_DRAG_STRIP).min(next_top.max(EDGE_MARGIN)),
    }
}
