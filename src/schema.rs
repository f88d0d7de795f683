pub const PLAYER_NAME: &str = "Player Name";
pub const TEAM: &str = "Team";
pub const POSITION_1: &str = "Position 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Players,
    Skills,
    Personality,
    Idp1,
    Idp2,
}

pub const ALL_TABLES: [TableKind; 5] = [
    TableKind::Players,
    TableKind::Skills,
    TableKind::Personality,
    TableKind::Idp1,
    TableKind::Idp2,
];

pub const DEPENDENT_TABLES: [TableKind; 4] = [
    TableKind::Skills,
    TableKind::Personality,
    TableKind::Idp1,
    TableKind::Idp2,
];

const PLAYERS_COLUMNS: &[&str] = &[
    PLAYER_NAME,
    TEAM,
    POSITION_1,
    "Position 2",
    "DOB",
    "Age",
    "Profile Picture",
];

const SKILLS_COLUMNS: &[&str] = &[
    PLAYER_NAME,
    "Date",
    "Focus Skill 1",
    "Focus Skill 2",
    "Focus Skill 3",
    "Development Skill 1",
    "Development Skill 2",
    "Development Skill 3",
];

const PERSONALITY_COLUMNS: &[&str] = &[PLAYER_NAME, "Trait", "Definition"];

const IDP1_COLUMNS: &[&str] = &[
    PLAYER_NAME,
    "Date",
    "Season Timing",
    "Goal",
    "Reality",
    "Opportunity",
    "Action Plan",
];

const IDP2_COLUMNS: &[&str] = &[
    PLAYER_NAME,
    "Date",
    "Development Area",
    "Component",
    "Intervention",
    "Responsibility",
    "Time Frame",
    "Success Measures",
];

impl TableKind {
    /// Worksheet name in the backing store.
    pub fn sheet_name(self) -> &'static str {
        match self {
            TableKind::Players => "Players",
            TableKind::Skills => "Skills",
            TableKind::Personality => "Personality",
            TableKind::Idp1 => "IDP_1",
            TableKind::Idp2 => "IDP_2",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Players => PLAYERS_COLUMNS,
            TableKind::Skills => SKILLS_COLUMNS,
            TableKind::Personality => PERSONALITY_COLUMNS,
            TableKind::Idp1 => IDP1_COLUMNS,
            TableKind::Idp2 => IDP2_COLUMNS,
        }
    }

    pub fn header(self) -> Vec<String> {
        self.columns().iter().map(|c| c.to_string()).collect()
    }

    pub fn from_sheet_name(name: &str) -> Option<Self> {
        ALL_TABLES.into_iter().find(|kind| kind.sheet_name() == name)
    }

    /// Whether the add-entry form pre-fills a Date field.
    pub fn has_date(self) -> bool {
        self.columns().contains(&"Date")
    }
}
