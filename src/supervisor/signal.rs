//! Control markers the backend writes to stderr.
//!
//! The web application asks the runtime to open its own windows or change zoom
//! by printing well-known phrases on stderr. Those lines are routed to the
//! presenter instead of the server log.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSignal {
    OpenConfiguration,
    OpenViewLog,
    ZoomIn,
    ZoomOut,
    ActualSize,
    ToggleFullScreen,
    NewWindowOpened,
}

const MARKERS: [(&str, RuntimeSignal); 7] = [
    ("Runtime Open Configuration", RuntimeSignal::OpenConfiguration),
    ("Runtime Open View Log", RuntimeSignal::OpenViewLog),
    ("Runtime Zoom In", RuntimeSignal::ZoomIn),
    ("Runtime Zoom Out", RuntimeSignal::ZoomOut),
    ("Runtime Actual Size", RuntimeSignal::ActualSize),
    ("Runtime Toggle Full Screen", RuntimeSignal::ToggleFullScreen),
    ("Runtime new window opened", RuntimeSignal::NewWindowOpened),
];

impl RuntimeSignal {
    /// Find a control marker anywhere in `line`.
    pub fn decode(line: &str) -> Option<Self> {
        MARKERS
            .iter()
            .find(|(marker, _)| line.contains(marker))
            .map(|(_, signal)| *signal)
    }
}
