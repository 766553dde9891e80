use crate::error::{CodecError, CodecResult};

fn field_str(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or("").trim_end()
}

fn require_len(buf: &[u8], len: usize) -> CodecResult<()> {
    if buf.len() < len {
        return Err(CodecError::NeedMore);
    }
    Ok(())
}

/// Flyweight view over an inbound `EnterOrder` (OUCH 4.2), fixed block only.
/// Field offsets follow the wire layout: msg-type(1) order-token(14)
/// side(1) shares(4) symbol(8) price(4, signed, x10000) tif(4) firm(4)
/// display(1) capacity(1) iso(1) min-qty(4) cross-type(1) customer-type(1).
pub struct EnterOrder<'a> {
    buf: &'a [u8],
}

impl<'a> EnterOrder<'a> {
    pub const LEN: usize = 49;

    const TOKEN: (usize, usize) = (1, 14);
    const SIDE: usize = 15;
    const SHARES: (usize, usize) = (16, 4);
    const SYMBOL: (usize, usize) = (20, 8);
    const PRICE: (usize, usize) = (28, 4);
    const TIF: (usize, usize) = (32, 4);
    const FIRM: (usize, usize) = (36, 4);
    const DISPLAY: usize = 40;
    const CAPACITY: usize = 41;
    const ISO: usize = 42;
    const MIN_QTY: (usize, usize) = (43, 4);
    const CROSS_TYPE: usize = 47;
    const CUSTOMER_TYPE: usize = 48;

    pub fn parse(buf: &'a [u8]) -> CodecResult<Self> {
        require_len(buf, Self::LEN)?;
        Ok(Self { buf })
    }

    pub fn order_token(&self) -> &'a str {
        field_str(&self.buf[Self::TOKEN.0..Self::TOKEN.0 + Self::TOKEN.1])
    }

    pub fn side(&self) -> u8 {
        self.buf[Self::SIDE]
    }

    pub fn shares(&self) -> u32 {
        u32::from_be_bytes(self.buf[Self::SHARES.0..Self::SHARES.0 + 4].try_into().unwrap())
    }

    pub fn symbol(&self) -> &'a str {
        field_str(&self.buf[Self::SYMBOL.0..Self::SYMBOL.0 + Self::SYMBOL.1])
    }

    /// Price in ten-thousandths of the quote currency (e.g. 1500000 == $150.0000).
    pub fn price(&self) -> i32 {
        i32::from_be_bytes(self.buf[Self::PRICE.0..Self::PRICE.0 + 4].try_into().unwrap())
    }

    pub fn time_in_force(&self) -> u32 {
        u32::from_be_bytes(self.buf[Self::TIF.0..Self::TIF.0 + 4].try_into().unwrap())
    }

    pub fn firm(&self) -> &'a str {
        field_str(&self.buf[Self::FIRM.0..Self::FIRM.0 + Self::FIRM.1])
    }

    pub fn display(&self) -> u8 {
        self.buf[Self::DISPLAY]
    }

    pub fn capacity(&self) -> u8 {
        self.buf[Self::CAPACITY]
    }

    pub fn iso(&self) -> u8 {
        self.buf[Self::ISO]
    }

    pub fn min_quantity(&self) -> u32 {
        u32::from_be_bytes(self.buf[Self::MIN_QTY.0..Self::MIN_QTY.0 + 4].try_into().unwrap())
    }

    pub fn cross_type(&self) -> u8 {
        self.buf[Self::CROSS_TYPE]
    }

    pub fn customer_type(&self) -> u8 {
        self.buf[Self::CUSTOMER_TYPE]
    }

    /// Writes a fixed-block `EnterOrder` into `out`. Caller writes appendages
    /// (if any) after `Self::LEN`.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        out: &mut [u8],
        order_token: &str,
        side: u8,
        shares: u32,
        symbol: &str,
        price: i32,
        time_in_force: u32,
        firm: &str,
        display: u8,
        capacity: u8,
        iso: u8,
        min_quantity: u32,
        cross_type: u8,
        customer_type: u8,
    ) -> CodecResult<usize> {
        if out.len() < Self::LEN {
            return Err(CodecError::BufferFull);
        }
        out[0] = super::msg_type::ENTER_ORDER;
        write_padded(&mut out[Self::TOKEN.0..Self::TOKEN.0 + Self::TOKEN.1], order_token.as_bytes());
        out[Self::SIDE] = side;
        out[Self::SHARES.0..Self::SHARES.0 + 4].copy_from_slice(&shares.to_be_bytes());
        write_padded(&mut out[Self::SYMBOL.0..Self::SYMBOL.0 + Self::SYMBOL.1], symbol.as_bytes());
        out[Self::PRICE.0..Self::PRICE.0 + 4].copy_from_slice(&price.to_be_bytes());
        out[Self::TIF.0..Self::TIF.0 + 4].copy_from_slice(&time_in_force.to_be_bytes());
        write_padded(&mut out[Self::FIRM.0..Self::FIRM.0 + Self::FIRM.1], firm.as_bytes());
        out[Self::DISPLAY] = display;
        out[Self::CAPACITY] = capacity;
        out[Self::ISO] = iso;
        out[Self::MIN_QTY.0..Self::MIN_QTY.0 + 4].copy_from_slice(&min_quantity.to_be_bytes());
        out[Self::CROSS_TYPE] = cross_type;
        out[Self::CUSTOMER_TYPE] = customer_type;
        Ok(Self::LEN)
    }
}

fn write_padded(out: &mut [u8], value: &[u8]) {
    let n = value.len().min(out.len());
    out[..n].copy_from_slice(&value[..n]);
    for b in &mut out[n..] {
        *b = b' ';
    }
}

/// Flyweight view over an outbound `OrderAccepted`.
pub struct OrderAccepted<'a> {
    buf: &'a [u8],
}

impl<'a> OrderAccepted<'a> {
    pub const LEN: usize = 1 + 8 + 14 + 1 + 4 + 8 + 4 + 4 + 4 + 1 + 1 + 1 + 8 + 4 + 1 + 1;

    pub fn parse(buf: &'a [u8]) -> CodecResult<Self> {
        require_len(buf, Self::LEN)?;
        Ok(Self { buf })
    }

    pub fn timestamp_ns(&self) -> i64 {
        i64::from_be_bytes(self.buf[1..9].try_into().unwrap())
    }

    pub fn order_token(&self) -> &'a str {
        field_str(&self.buf[9..23])
    }
}

/// Flyweight view over an outbound `OrderCanceled`.
pub struct OrderCanceled<'a> {
    buf: &'a [u8],
}

impl<'a> OrderCanceled<'a> {
    pub const LEN: usize = 1 + 8 + 14 + 4 + 1;

    pub fn parse(buf: &'a [u8]) -> CodecResult<Self> {
        require_len(buf, Self::LEN)?;
        Ok(Self { buf })
    }

    pub fn order_token(&self) -> &'a str {
        field_str(&self.buf[9..23])
    }

    pub fn decrement_shares(&self) -> u32 {
        u32::from_be_bytes(self.buf[23..27].try_into().unwrap())
    }

    pub fn reason(&self) -> u8 {
        self.buf[27]
    }
}

/// Flyweight view over an outbound `OrderRejected`.
pub struct OrderRejected<'a> {
    buf: &'a [u8],
}

impl<'a> OrderRejected<'a> {
    pub const LEN: usize = 1 + 8 + 14 + 1;

    pub fn parse(buf: &'a [u8]) -> CodecResult<Self> {
        require_len(buf, Self::LEN)?;
        Ok(Self { buf })
    }

    pub fn order_token(&self) -> &'a str {
        field_str(&self.buf[9..23])
    }

    pub fn reason(&self) -> u8 {
        self.buf[23]
    }
}

/// Flyweight view over an inbound `Replace` request.
pub struct Replace<'a> {
    buf: &'a [u8],
}

impl<'a> Replace<'a> {
    pub const LEN: usize = 1 + 14 + 14 + 4 + 4 + 4 + 1;

    pub fn parse(buf: &'a [u8]) -> CodecResult<Self> {
        require_len(buf, Self::LEN)?;
        Ok(Self { buf })
    }

    pub fn existing_order_token(&self) -> &'a str {
        field_str(&self.buf[1..15])
    }

    pub fn replacement_order_token(&self) -> &'a str {
        field_str(&self.buf[15..29])
    }

    pub fn shares(&self) -> u32 {
        u32::from_be_bytes(self.buf[29..33].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_and_parses_an_enter_order() {
        let mut buf = [0u8; EnterOrder::LEN];
        EnterOrder::encode(
            &mut buf,
            "AAA00000000001",
            b'B',
            100,
            "AAPL",
            1_500_000,
            99_999,
            "FIRM",
            b'Y',
            b'O',
            b'N',
            0,
            b'N',
            b'R',
        )
        .unwrap();
        let order = EnterOrder::parse(&buf).unwrap();
        assert_eq!(order.order_token(), "AAA00000000001");
        assert_eq!(order.side(), b'B');
        assert_eq!(order.shares(), 100);
        assert_eq!(order.symbol(), "AAPL");
        assert_eq!(order.price(), 1_500_000);
        assert_eq!(order.firm(), "FIRM");
        assert_eq!(order.display(), b'Y');
    }
}
