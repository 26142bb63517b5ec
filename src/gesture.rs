//! Gesture events delivered by the proximity sensor in front of the matrix.

use serde::{Deserialize, Serialize};

/// Sensor edge or swipe direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Center,
}

/// One recognised gesture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Gesture {
    /// Single touch on an edge of the sensor
    Tap { at: Direction },
    /// Two touches in quick succession
    DoubleTap { at: Direction },
    /// Hand moved across the sensor towards `towards`
    Swipe { towards: Direction },
    /// Circular motion; `rotation` is in turns, positive clockwise
    AirWheel { rotation: f64 },
}

impl Gesture {
    pub fn is_tap(&self) -> bool {
        matches!(self, Gesture::Tap { .. })
    }

    /// Pane navigation step for swipes: +1 forward, -1 back.
    pub fn navigation_step(&self) -> Option<isize> {
        match self {
            Gesture::Swipe {
                towards: Direction::East | Direction::North,
            } => Some(1),
            Gesture::Swipe {
                towards: Direction::West | Direction::South,
            } => Some(-1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_steps() {
        let swipe = |towards| Gesture::Swipe { towards };
        assert_eq!(swipe(Direction::East).navigation_step(), Some(1));
        assert_eq!(swipe(Direction::North).navigation_step(), Some(1));
        assert_eq!(swipe(Direction::West).navigation_step(), Some(-1));
        assert_eq!(swipe(Direction::South).navigation_step(), Some(-1));
        assert_eq!(swipe(Direction::Center).navigation_step(), None);
        assert_eq!(
            Gesture::Tap {
                at: Direction::Center
            }
            .navigation_step(),
            None
        );
    }

    #[test]
    fn test_gesture_json_shape() {
        let parsed: Gesture =
            serde_json::from_str(r#"{"type":"airWheel","rotation":0.25}"#).unwrap();
        assert_eq!(parsed, Gesture::AirWheel { rotation: 0.25 });

        let tap: Gesture = serde_json::from_str(r#"{"type":"tap","at":"north"}"#).unwrap();
        assert!(tap.is_tap());
    }
}
