use std::fmt::Write;

/// Leveled log sink: 0 is silent, 1 warnings, 2 info, 3 and up verbose.
/// Output at or below `buffer_level` is kept in a string buffer, output at or
/// below `stderr_level` is also printed.
pub struct Logger {
    effective_level: u32,
    buffer_level: u32,
    stderr_level: u32,
    buffer: String,
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Self {
            effective_level: self.effective_level,
            buffer_level: self.buffer_level,
            stderr_level: self.stderr_level,
            buffer: String::new(), // clean logs on clone
        }
    }
}

impl Logger {
    pub fn new(buffer_level: u32, stderr_level: u32) -> Self {
        Self {
            buffer_level,
            stderr_level,
            effective_level: std::cmp::max(buffer_level, stderr_level),
            buffer: String::new(),
        }
    }

    pub fn quiet() -> Self {
        Self::new(0, 0)
    }

    pub fn warn(&mut self, s: &str) {
        if self.level_enabled(1) {
            self.write_warning("Warning: ");
            self.write_warning(s);
            self.write_warning("\n");
        }
    }

    pub fn info(&mut self, s: &str) {
        if self.level_enabled(2) {
            self.write_at(2, s);
            self.write_at(2, "\n");
        }
    }

    #[inline(always)]
    pub fn level_enabled(&self, level: u32) -> bool {
        level <= self.effective_level
    }

    #[inline(always)]
    pub fn buffer_level(&self) -> u32 {
        self.buffer_level
    }

    #[inline(always)]
    pub fn stderr_level(&self) -> u32 {
        self.stderr_level
    }

    pub fn set_buffer_level(&mut self, buffer_level: u32) {
        self.buffer_level = buffer_level;
        self.effective_level = std::cmp::max(self.buffer_level, self.stderr_level);
    }

    pub fn set_stderr_level(&mut self, stderr_level: u32) {
        self.stderr_level = stderr_level;
        self.effective_level = std::cmp::max(self.buffer_level, self.stderr_level);
    }

    pub fn get_buffer(&self) -> &str {
        &self.buffer
    }

    pub fn get_and_clear_logs(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    fn write_at(&mut self, level: u32, s: &str) {
        if level <= self.buffer_level {
            self.buffer.push_str(s);
        }
        if level <= self.stderr_level {
            eprint!("{}", s);
        }
    }

    pub fn write_warning(&mut self, s: &str) {
        self.write_at(1, s);
    }

    /// Sink for `writeln!` at info level.
    pub fn info_logger(&mut self) -> LevelWriter<'_> {
        LevelWriter {
            logger: self,
            level: 2,
        }
    }

    /// Sink for `writeln!` at warning level.
    pub fn warning_logger(&mut self) -> LevelWriter<'_> {
        LevelWriter {
            logger: self,
            level: 1,
        }
    }
}

pub struct LevelWriter<'a> {
    logger: &'a mut Logger,
    level: u32,
}

impl Write for LevelWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.logger.write_at(self.level, s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_levels() {
        let mut logger = Logger::new(1, 0);
        logger.info("not kept");
        logger.warn("kept");
        assert_eq!(logger.get_buffer(), "Warning: kept\n");

        logger.set_buffer_level(2);
        crate::loginfo!(logger, "x = {}", 42);
        assert_eq!(logger.get_and_clear_logs(), "Warning: kept\nx = 42\n");
        assert_eq!(logger.get_buffer(), "");
    }

    #[test]
    fn test_clone_drops_buffer() {
        let mut logger = Logger::new(2, 0);
        logger.info("hello");
        let copy = logger.clone();
        assert_eq!(copy.get_buffer(), "");
        assert_eq!(copy.buffer_level(), 2);
        assert!(!Logger::quiet().level_enabled(1));
    }
}
