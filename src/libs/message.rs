use super::args::GroupName;
use super::error::AppError;
use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// A record as delivered by the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl Inbound {
    /// Payload as UTF-8, invalid sequences replaced. Tombstones render empty.
    pub fn text(&self) -> Cow<'_, str> {
        match &self.payload {
            Some(p) => String::from_utf8_lossy(p),
            None => Cow::Borrowed(""),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait MessageHandler {
    async fn handle(&self, message: &Inbound) -> Result<(), AppError>;
}

struct Line<'a>(&'a GroupName, &'a Inbound);

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (group, m) = (self.0, self.1);
        write!(f, "{}: [{}] PART:{}: {}", group, m.topic, m.partition, m.text())
    }
}

/// Writes one line per message.
pub struct PrintHandler<W> {
    group: GroupName,
    out: Mutex<W>,
}

impl<W: Write> PrintHandler<W> {
    pub fn new(group: GroupName, out: W) -> Self {
        Self {
            group,
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write> MessageHandler for PrintHandler<W> {
    async fn handle(&self, message: &Inbound) -> Result<(), AppError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "{}", Line(&self.group, message))
            .and_then(|_| out.flush())
            .map_err(|e| AppError::Handler(e.into()))
    }
}
