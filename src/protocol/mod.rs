//! Wire protocol spoken by the touch controller over its UART.

pub mod line;

pub use line::{
    encode_frame_end, encode_row, Line, LineAssembler, RowLine, CMD_FRAME_END, CMD_ROW, HEADER,
};
