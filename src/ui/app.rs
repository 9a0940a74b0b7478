#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartTab {
    RequestsCalendar,
    AcceptedLinesCalendar,
    LastSevenDays,
    WeekdayDistribution,
    Tokens,
    Costs,
}

impl ChartTab {
    pub const ALL: [ChartTab; 6] = [
        ChartTab::RequestsCalendar,
        ChartTab::AcceptedLinesCalendar,
        ChartTab::LastSevenDays,
        ChartTab::WeekdayDistribution,
        ChartTab::Tokens,
        ChartTab::Costs,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ChartTab::RequestsCalendar => "Agent Messages",
            ChartTab::AcceptedLinesCalendar => "Accepted Lines of Code",
            ChartTab::LastSevenDays => "Last 7 Days Activity",
            ChartTab::WeekdayDistribution => "Usage by Day of Week",
            ChartTab::Tokens => "Token Usage",
            ChartTab::Costs => "Cost Usage",
        }
    }

    fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|tab| *tab == self)
            .unwrap_or_default()
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub running: bool,
    pub tab: ChartTab,
    pub status: String,
    pub confirm_quit: bool,
    pub reload_requested: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            running: true,
            tab: ChartTab::RequestsCalendar,
            status: "ready".into(),
            confirm_quit: false,
            reload_requested: false,
        }
    }
}
