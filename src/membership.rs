/// Другие участники комнаты в порядке появления.
///
/// После разрыва транспорта набор неизвестен до следующего снимка.
#[derive(Debug, Default)]
pub struct Membership {
    self_id: Option<String>,
    peers: Vec<String>,
    synced: bool,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    /// Новый идентификатор от транспорта. Возвращает предыдущий, если был
    pub fn set_self_id(&mut self, id: impl Into<String>) -> Option<String> {
        self.self_id.replace(id.into())
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.iter().any(|p| p == id)
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn first_peer(&self) -> Option<&str> {
        self.peers.first().map(String::as_str)
    }

    fn is_self(&self, id: &str) -> bool {
        self.self_id.as_deref() == Some(id)
    }

    /// Снимок участников заменяет набор целиком, себя исключаем
    pub fn apply_snapshot(&mut self, ids: Vec<String>) {
        self.peers.clear();
        for id in ids {
            if !self.is_self(&id) && !self.contains(&id) {
                self.peers.push(id);
            }
        }
        self.synced = true;
    }

    /// true, если участник добавлен
    pub fn join(&mut self, id: &str) -> bool {
        if self.is_self(id) || self.contains(id) {
            return false;
        }
        self.peers.push(id.to_string());
        true
    }

    /// true, если участник был в наборе
    pub fn leave(&mut self, id: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != id);
        self.peers.len() != before
    }

    pub fn mark_unknown(&mut self) {
        self.peers.clear();
        self.synced = false;
    }
}
