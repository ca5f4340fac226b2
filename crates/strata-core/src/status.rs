pub const MAX_TRIES: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Good,
    Bad,
    Tryable { tries: u32 },
}

impl SystemStatus {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("good") {
            return Self::Good;
        }
        if raw.starts_with("bad") {
            return Self::Bad;
        }
        if let Some(rest) = raw.strip_prefix("tried ") {
            return match rest.trim_end().parse::<i64>() {
                Ok(tries) if tries >= 1 && tries < i64::from(MAX_TRIES) => Self::Tryable {
                    tries: tries as u32,
                },
                Ok(_) | Err(_) => Self::Bad,
            };
        }
        Self::Bad
    }

    pub fn emit(&self) -> String {
        match self {
            Self::Good => "good".to_string(),
            Self::Bad => "bad".to_string(),
            Self::Tryable { tries } => format!("tried {tries}"),
        }
    }
}
