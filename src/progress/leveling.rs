//! XP curve and level-up resolution

/// XP ceiling of a brand-new player
pub const BASE_XP_MAX: u64 = 1000;

/// XP granted per completed exercise
pub const XP_PER_EXERCISE: u64 = 10;

/// Next ceiling after a level-up: floor(xp_max * 1.5)
pub fn next_xp_max(xp_max: u64) -> u64 {
    xp_max.saturating_add(xp_max / 2)
}

/// Level state after resolving an XP gain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelState {
    pub level: u32,
    pub xp: u64,
    pub xp_max: u64,
}

impl LevelState {
    /// Add XP and resolve every level-up it pays for.
    /// Returns the number of levels gained; on exit `xp < xp_max`.
    pub fn gain(&mut self, xp_gained: u64) -> u32 {
        // Below 2 the ceiling never grows (floor(1 * 1.5) == 1) or never terminates
        if self.xp_max < 2 {
            self.xp_max = BASE_XP_MAX;
        }

        self.xp = self.xp.saturating_add(xp_gained);
        let mut levels = 0;

        while self.xp >= self.xp_max {
            self.xp -= self.xp_max;
            self.level = self.level.saturating_add(1);
            self.xp_max = next_xp_max(self.xp_max);
            levels += 1;
        }

        levels
    }
}
